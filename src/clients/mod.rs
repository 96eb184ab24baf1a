pub mod addon;
pub mod metadata;
pub mod seadex;

pub use addon::HttpAddon;
pub use metadata::{
    Metadata, MetadataProvider, MetadataQuery, ReleaseDate, ReleaseKind, SeasonInfo, TmdbClient,
};
pub use seadex::{SeaDexClient, SeaDexInfo, SeaDexProvider};
