pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;
pub mod shell;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::{MockCommandConfig, MockProcessRunner};
pub use runner::{
    ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, ProcessStream, TokioProcessRunner,
};
pub use shell::ShellExecutor;
