//! Encoder process pipeline
//!
//! Wires any number of input and output byte streams through dedicated OS
//! pipes into one external encoder invocation.

use crate::domain::model::StreamRole;
use crate::streams::{SinkHandle, SourceHandle};

mod args;
pub mod fds;
pub mod pipeline;

pub use pipeline::{Pipeline, ProcessSession};

/// Encoder input: a live stream fed through a pipe, or something the encoder
/// opens itself
#[derive(Debug, Clone)]
pub enum Input {
    Stream(SourceHandle),
    Location(String),
}

impl Input {
    /// Same underlying input
    pub fn same(&self, other: &Input) -> bool {
        match (self, other) {
            (Input::Stream(a), Input::Stream(b)) => a.same(b),
            (Input::Location(a), Input::Location(b)) => a == b,
            _ => false,
        }
    }
}

/// Encoder output: a live sink fed through a pipe, or a destination the
/// encoder writes itself
#[derive(Debug, Clone)]
pub enum Output {
    Stream(SinkHandle),
    Location(String),
}

impl Output {
    pub fn same(&self, other: &Output) -> bool {
        match (self, other) {
            (Output::Stream(a), Output::Stream(b)) => a.same(b),
            (Output::Location(a), Output::Location(b)) => a == b,
            _ => false,
        }
    }
}

/// Output codec for one mapped stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    Audio(String),
    Video(String),
    Subtitle(String),
}

impl Codec {
    pub fn for_role(role: StreamRole, name: impl Into<String>) -> Self {
        match role {
            StreamRole::Audio => Codec::Audio(name.into()),
            StreamRole::Video => Codec::Video(name.into()),
            StreamRole::Subtitle => Codec::Subtitle(name.into()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Codec::Audio(n) | Codec::Video(n) | Codec::Subtitle(n) => n,
        }
    }

    /// `-codec:a` and friends
    pub fn flag(&self) -> &'static str {
        match self {
            Codec::Audio(_) => "-codec:a",
            Codec::Video(_) => "-codec:v",
            Codec::Subtitle(_) => "-codec:s",
        }
    }
}

/// One input stream selected into an output
#[derive(Debug, Clone)]
pub struct Map {
    pub input: Input,
    /// Stream specifier inside the input, e.g. `a:0`
    pub specifier: String,
    pub codec: Codec,
    pub codec_flags: Vec<String>,
}

/// Output container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFormat {
    pub name: String,
    pub flags: Vec<String>,
}

impl ContainerFormat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: vec![],
        }
    }
}

/// One encoder output and the maps feeding it
#[derive(Debug, Clone)]
pub struct StreamSession {
    /// Flags placed before each `-i` first referenced by this session
    pub input_flags: Vec<String>,
    pub output_flags: Vec<String>,
    pub maps: Vec<Map>,
    pub format: ContainerFormat,
    pub metadata: Vec<(String, String)>,
    pub output: Output,
}

impl StreamSession {
    pub fn new(format: ContainerFormat, output: Output) -> Self {
        Self {
            input_flags: vec![],
            output_flags: vec![],
            maps: vec![],
            format,
            metadata: vec![],
            output,
        }
    }

    pub fn with_map(mut self, map: Map) -> Self {
        self.maps.push(map);
        self
    }
}
