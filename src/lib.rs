pub mod batch;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod lister;
pub mod logger;
pub mod optimizer;
pub mod pipeline;
pub mod storage;

pub use batch::{process_all, SweepJournal, SweepSummary};
pub use config::{CodecTuning, Config};
pub use error::{Result, SqueezeError};
pub use event::{process_event, NotificationEvent};
pub use lister::KeyLister;
pub use optimizer::{optimize_image, sniff_format, SniffedFormat};
pub use pipeline::{eligibility, normalize_key, process_one, Outcome, SkipReason};
pub use storage::{
    FetchedObject, ListPage, MemoryStore, ObjectHead, ObjectStore, PutRequest, S3Store,
    StoredObject,
};
