pub mod id;
pub mod stream;
pub mod user;

pub use id::{IdSource, IdValue, MediaType, ParsedId};
pub use stream::{ParsedFile, ParsedStream, SeaDexTag, ServiceInfo, StreamType, TorrentInfo};
pub use user::UserData;
