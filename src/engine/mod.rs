pub mod matching;
pub mod notifier;
pub mod pricing;
pub mod scoring;
pub mod sweeper;
