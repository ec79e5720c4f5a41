//! Launch commands for the external media executables
//!
//! A [`CommandBuilder`] turns a typed config into the argument list for one
//! session. Builders are pure; the supervisor calls them before every launch.

use std::fmt;

use crate::config::{ReceiverConfig, SenderConfig};
use crate::error::ConfigError;

/// Program plus arguments for one process launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Produces the launch command for a session config
pub trait CommandBuilder: Send + Sync + 'static {
    type Config: Clone + Send + Sync + 'static;

    fn build(&self, config: &Self::Config) -> LaunchCommand;

    /// Reject a config before anything is launched
    fn validate(&self, _config: &Self::Config) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Screen capture and H.264 encode, streamed as MPEG-TS over TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegSenderCommand;

impl CommandBuilder for FfmpegSenderCommand {
    type Config = SenderConfig;

    fn build(&self, config: &SenderConfig) -> LaunchCommand {
        let mut cmd = LaunchCommand::new(&config.executable)
            .args(["-f", "avfoundation", "-capture_cursor", "1"])
            .args(["-pixel_format", "uyvy422"])
            .arg("-framerate")
            .arg(config.fps.to_string())
            .arg("-i")
            .arg(format!("{}:{}", config.screen_index, config.audio_index))
            .args(["-c:v", "libx264"])
            .arg("-preset")
            .arg(&config.preset)
            .arg("-tune")
            .arg(&config.tune)
            .arg("-b:v")
            .arg(&config.bitrate)
            .arg("-g")
            .arg(config.gop_size.to_string())
            .args(["-pix_fmt", "yuv420p"]);

        if let Some(resolution) = &config.scaling_resolution {
            cmd = cmd.arg("-vf").arg(format!("scale={resolution}"));
        }

        cmd.args(["-f", "mpegts"])
            .arg(format!("tcp://{}:{}", config.receiver_ip, config.receiver_port))
    }

    fn validate(&self, config: &SenderConfig) -> Result<(), ConfigError> {
        config.validate()
    }
}

/// Low-delay MPEG-TS playback listening for one TCP connection
#[derive(Debug, Clone, Copy, Default)]
pub struct FfplayReceiverCommand;

impl CommandBuilder for FfplayReceiverCommand {
    type Config = ReceiverConfig;

    fn build(&self, config: &ReceiverConfig) -> LaunchCommand {
        let mut cmd = LaunchCommand::new(&config.executable);
        if config.fullscreen {
            cmd = cmd.arg("-fs");
        }

        cmd.arg("-window_title")
            .arg(&config.window_title)
            .arg("-fflags")
            .arg(&config.fflags)
            .args(["-flags", "low_delay", "-strict", "experimental"])
            .arg("-probesize")
            .arg(&config.probesize)
            .arg("-analyzeduration")
            .arg(&config.analyzeduration)
            // Drop timestamps so frames are shown as soon as they arrive
            .args(["-vf", "setpts=0"])
            .args(["-f", "mpegts"])
            .arg(format!("tcp://{}:{}?listen", config.listen_ip, config.port))
    }

    fn validate(&self, config: &ReceiverConfig) -> Result<(), ConfigError> {
        config.validate()
    }
}

/// `<executable> -version`, used to check the dependency is installed
pub fn version_command(executable: &str) -> LaunchCommand {
    LaunchCommand::new(executable).arg("-version")
}

/// Lists AVFoundation capture devices; ffmpeg prints them on stderr
pub fn list_devices_command(executable: &str) -> LaunchCommand {
    LaunchCommand::new(executable).args(["-f", "avfoundation", "-list_devices", "true", "-i", ""])
}
