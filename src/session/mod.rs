//! Stream sessions: launching, watching and restarting the media process

pub mod command;
pub mod outcome;
pub mod process;
pub mod state;
pub mod supervisor;

pub use command::{CommandBuilder, FfmpegSenderCommand, FfplayReceiverCommand, LaunchCommand};
pub use outcome::{ExitOutcome, FailureCause};
pub use process::{probe_executable, MediaProcess};
pub use state::{SessionEvent, SessionState, SessionStatus};
pub use supervisor::{StartOutcome, StreamSupervisor};
