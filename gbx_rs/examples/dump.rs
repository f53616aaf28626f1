use std::io::Read;

fn main() -> Result<(), &'static str> {
    tracing_subscriber::fmt::init();

    let args = std::env::args().collect::<Vec<_>>();
    let [_, filename] = &args[..] else {
        return Err("expected one arg, gbx filename");
    };

    let mut file = std::fs::File::open(filename).map_err(|_| "couldn't open file")?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|_| "couldn't read file")?;

    let mut gbx = match gbx_rs::Gbx::read(data) {
        Ok(gbx) => gbx,
        Err(err) => {
            println!("{}", err);
            return Ok(());
        }
    };
    let discovered = gbx.body.discover_all();

    println!(
        "{} v{}, {} header chunks",
        gbx.header.class_name().unwrap_or("unknown class"),
        gbx.header.version,
        gbx.header.chunks.len()
    );
    for chunk in &gbx.header.chunks {
        println!("  header {} ({} bytes)", chunk.id, chunk.data().len());
        if let Some(record) = chunk.record() {
            for (name, value) in record.iter() {
                println!("    {}: {:?}", name, value);
            }
        }
    }

    println!("{} nodes, {} chunks discovered", gbx.body.len(), discovered);
    for (index, node) in gbx.body.nodes() {
        println!("  node {} {}", index, node.class_name().unwrap_or("?"));
        for chunk in node.chunks() {
            let kind = if chunk.is_skippable() { "skippable" } else { "regular" };
            println!("    {} {}", chunk.id(), kind);
        }
    }

    for diagnostic in gbx.diagnostics() {
        println!("{}", diagnostic);
    }

    Ok(())
}
