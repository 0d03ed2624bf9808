pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod media;
pub mod orchestrator;
pub mod plan;
pub mod presets;
pub mod sidecar_api;
pub mod storage;

pub use engine::{CodecEngine, FfmpegEngine};
pub use error::AppError;
pub use media::{CompressionRequest, CompressionResult, MediaFile, MediaKind};
pub use orchestrator::{JobObserver, JobSnapshot, JobState, Orchestrator};

/// Install the stderr logger: `HH:MM:SS  LEVEL  target  message`, `fit_size::` stripped from
/// targets. Level comes from `RUST_LOG`, default `info`. Safe to call more than once.
pub fn init_logging() {
    use std::io::Write;
    use time::macros::format_description;

    let time_fmt = format_description!("[hour]:[minute]:[second]");
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format(move |buf, record| {
            let ts = time::OffsetDateTime::now_utc()
                .format(&time_fmt)
                .unwrap_or_else(|_| "??:??:??".into());
            let target = record
                .target()
                .strip_prefix("fit_size::")
                .unwrap_or(record.target());
            writeln!(
                buf,
                "{ts}  {level:5}  {target:5}  {message}",
                ts = ts,
                level = record.level(),
                target = target,
                message = record.args()
            )
        })
        .try_init();
}
