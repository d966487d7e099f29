//! Protocol pieces shared by the arena server and client: frame codec, player
//! records, address handling and the common error type.

pub mod address;
pub mod error;
pub mod framing;
pub mod player;

pub use address::{is_valid_address, local_ip, parse_server_address};
pub use error::ProtocolError;
pub use framing::{read_frame, write_frame};
pub use player::{
    color_for, decode_roster, encode_roster, next_player_id, Direction, PlayerId, PlayerState,
    RosterMessage, WirePlayer, PALETTE,
};

pub const DEFAULT_PORT: u16 = 10002;
pub const ARENA_WIDTH: i32 = 600;
pub const ARENA_HEIGHT: i32 = 400;
pub const DOT_SIZE: i32 = 20;
pub const MOVE_SIZE: i32 = 5;
