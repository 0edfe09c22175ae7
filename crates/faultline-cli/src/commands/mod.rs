mod sample;
mod serve;

pub use sample::SampleCommand;
pub use serve::ServeCommand;
