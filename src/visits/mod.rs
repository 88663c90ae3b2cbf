pub mod ip;
pub mod recorder;

pub use ip::{extract_client_ip, hash_ip};
pub use recorder::{RecorderStats, VisitRecorder};
