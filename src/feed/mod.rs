pub mod multipart;
mod orchestrator;
#[cfg(test)]
mod tests;

pub use orchestrator::{FeedFrame, FeedMode, FeedOrchestrator, FeedSettings};
