//! Compiled-in class schemas.

use crate::schema::classes;

classes! {
    CMwNod 0x01001000 {}

    CGameCtnCollector 0x2e001000: CMwNod {
        #[header] 0x003 {
            ident: ident,
            version: byte,
            page_name: string,
            if version == 5 { u01: string }
            if version >= 4 { u02: id }
            if version >= 3 {
                u03: int,
                catalog_position: uint16,
            }
            if version >= 7 { name: string }
            if version >= 8 { prod_state: byte }
        }
        #[header] 0x006 { file_time: uint64 }
        0x009 {
            page_name: string,
            has_icon_fid: bool,
            if has_icon_fid { icon_fid: node }
            parent_collector_id: id,
        }
        0x00b { ident: ident }
        0x00c { name: string }
        0x00d { description: string }
        0x00e { icon_use_auto_render: bool, icon_quarter_rotation_y: int }
        0x010 { version: int, skin_directory: fileref }
        0x011 { version: int, is_internal: bool, is_advanced: bool, catalog_position: int }
    }

    CGameItemModel 0x2e002000: CGameCtnCollector {
        #[header] 0x000 { item_type: int }
        0x008 { nadeo_skin_fids: [ skin: node ] }
        0x009 { cameras: [ camera: node ] }
        0x00c { race_interface_fid: node }
        0x012 { ground_point: vec3, painter_ground_margin: float, orbital_center_height: float, orbital_radius: float }
        0x013 { audio_environment: node }
        0x014 { baked_occlusion: node }
    }

    CGameWaypointSpecialProperty 0x2e009000: CMwNod {
        0x000 {
            version: int,
            if version == 1 {
                spawn: int,
                order: int,
            } else {
                tag: string,
                order: int,
            }
        }
        #[skippable] 0x001 { version: int, u01: int }
    }

    CGameCtnChallenge 0x03043000: CMwNod {
        #[header] #[versions(0, 13)] 0x002 {
            version: byte,
            if version <= 2 {
                map_info: ident,
                map_name: string,
            }
            u01: uint,
            if version >= 1 {
                bronze_time: time,
                silver_time: time,
                gold_time: time,
                author_time: time,
            }
            if version == 2 { u02: byte }
            if version >= 4 { cost: int }
            if version >= 5 { is_lap_race: bool }
            if version == 6 { is_multilap: bool }
            if version >= 7 { play_mode: int }
            if version >= 9 { u03: int }
            if version >= 10 { author_score: int }
            if version >= 11 { editor_mode: int }
            if version >= 12 { u04: int }
            if version >= 13 {
                nb_checkpoints: int,
                nb_laps: int,
            }
        }
        #[header] #[versions(0, 13)] 0x003 {
            version: byte,
            map_info: ident,
            map_name: string,
            kind: byte,
            if version >= 1 {
                locked: uint,
                password: string,
            }
            if version >= 2 { decoration: ident }
            if version >= 3 { map_coord_origin: vec2 }
            if version >= 4 { map_coord_target: vec2 }
            if version >= 5 { pack_mask: uint128 }
            if version >= 6 {
                map_type: string,
                map_style: string,
            }
            if version >= 8 { lightmap_cache_uid: uint64 }
            if version >= 9 { lightmap_version: byte }
            if version >= 11 { title_id: id }
        }
        #[header] 0x004 { version: int }
        #[header] 0x005 { xml: string }
        #[header] 0x008 {
            version: int,
            author_version: int,
            author_login: string,
            author_nickname: string,
            author_zone: string,
            author_extra_info: string,
        }
        0x00d { vehicle: ident }
        0x011 {
            block_stock: node,
            challenge_parameters: node,
            kind: int,
        }
        #[skippable] #[eager] 0x018 { is_lap_race: bool, nb_laps: int }
        #[skippable] 0x019 { mod_pack_desc: fileref }
        #[skippable] 0x01c { play_mode: int }
        0x01f {
            map_info: ident,
            map_name: string,
            decoration: ident,
            size: int3,
            need_unlock: uint,
            blocks: scan,
        }
        0x022 { u01: int }
        0x024 { custom_music: fileref }
        0x025 { map_coord_origin: vec2, map_coord_target: vec2 }
        0x02a { simple_editor: bool }
        0x049 { data: scan }
    }

    CGameCtnChallengeParameters 0x0305b000: CMwNod {
        0x001 {
            tip1: string,
            tip2: string,
            tip3: string,
            tip4: string,
        }
        0x004 {
            bronze_time: time,
            silver_time: time,
            gold_time: time,
            author_time: time,
            u01: int,
        }
        0x008 { time_limit: time, author_score: int }
        #[skippable] 0x00a {
            tip: string,
            bronze_time: time,
            silver_time: time,
            gold_time: time,
            author_time: time,
            time_limit: time,
            author_score: int,
        }
        0x00d { race_validate_ghost: node }
        #[skippable] #[ignored] 0x00e { data: rest }
    }

    CGameCtnGhost 0x03092000: CMwNod {}

    CGameCtnBlockSkin 0x03059000: CMwNod {
        0x000 { text: string, u01: string }
        0x001 { text: string, pack_desc: fileref }
        0x002 {
            text: string,
            pack_desc: fileref,
            parent_pack_desc: fileref,
        }
        0x003 { version: int, foreground_pack_desc: fileref }
    }

    CGameCtnCollectorList 0x0301b000: CMwNod {
        0x000 { block_set: [ collector: ident ] }
    }

    CGameCtnMediaTrack 0x03078000: CMwNod {
        0x001 { name: string, u01: int, blocks: [ block: node ], u02: int }
        0x004 { keep_playing: bool }
        0x005 {
            version: int,
            keep_playing: bool,
            read_only: bool,
            cycle_loop: bool,
        }
    }

    CGameCtnMediaClip 0x03079000: CMwNod {
        0x002 { version: int, tracks: [ track: node ], name: string, u01: int }
        0x003 { version: int, tracks: [ track: node ], name: string }
        0x004 { u01: node }
        0x005 { version: int, tracks: [ track: node ], name: string }
        0x007 { local_player_clip_ent_index: int }
        0x008 { u01: float }
        0x009 { u01: string }
        0x00a { stop_when_leave: bool }
        0x00b { u01: bool }
        0x00c { u01: int }
        0x00d {
            u01: int,
            version: int,
            tracks: [ track: node ],
            name: string,
            stop_when_leave: bool,
            u03: bool,
            stop_when_respawn: bool,
            u05: string,
            u06: float,
            local_player_clip_ent_index: int,
        }
    }

    CGameCtnMediaBlockColoringBase 0x03172000: CMwNod {
        0x000 {
            version: int,
            u01: int,
            keys: [
                time: float,
                hue: float,
                intensity: float,
                u02: int16,
            ],
            base_index: int,
        }
    }

    CGameCtnMediaBlockBloomHdr 0x03128000: CMwNod {
        0x001 {
            keys: [
                time: float,
                intensity: float,
                streaks_intensity: float,
                streaks_attenuation: float,
            ],
        }
        0x002 {
            keys: [
                time: float,
                intensity: float,
                streaks_intensity: float,
                streaks_attenuation: float,
            ],
        }
    }

    CGamePlayerProfile 0x0308c000: CMwNod {
        0x000 { online_login: string, online_support_key: string }
        0x006 { input_bindings: node }
        0x008 { u01: int }
        0x009 {
            u01: int,
            u02: int,
            u03: int,
            u04: int,
            u05: int,
            u06: int,
        }
        0x00a { u01: int, u02: int }
        0x011 { u01: int }
        0x014 { u01: int }
        0x01b {
            cars: [ car: id ],
            u01: int,
            u02: int,
            u03: int,
            u04: int,
            u05: int,
        }
        0x01e {
            skins: [
                player_model: ident,
                skin_file: string,
                checksum: uint,
            ],
        }
        0x01f {
            profile_name: string,
            display_profile_name: string,
            device_guid: id,
            u01: int,
        }
        0x023 { u01: int }
        #[skippable] 0x029 { description: string }
        #[skippable] #[own_ids] 0x07c { keyboard_guid: id, profile_name: string }
    }

    CGameCtnAnchoredObject 0x03101000: CMwNod {
        #[versions(0, 8)] 0x002 {
            version: int,
            item_model: ident,
            pitch_yaw_roll: vec3,
            block_unit_coord: byte3,
            anchor_tree_id: id,
            absolute_position: vec3,
            waypoint_special_property: node,
            if version >= 4 { flags: uint16 }
            if version >= 5 {
                pivot_position: vec3,
                scale: float,
            }
            if version >= 7 {
                if flags & 4 == 4 { foreground_pack_desc: fileref }
            }
            if version >= 8 {
                u01: vec3,
                u02: vec3,
            }
        }
    }
}
