// Domain models - Target formats, source streams and tag metadata

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::priority::PrioritySet;

/// Role a stream plays in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    Audio,
    Video,
    Subtitle,
}

impl StreamRole {
    /// Stream type letter used by the encoder (`-codec:a`, `0:a:0`, ...)
    pub fn letter(&self) -> &'static str {
        match self {
            StreamRole::Audio => "a",
            StreamRole::Video => "v",
            StreamRole::Subtitle => "s",
        }
    }

    /// Parse role from the inspector's `codec_type` naming
    pub fn from_codec_type(codec_type: &str) -> Option<Self> {
        match codec_type {
            "audio" => Some(StreamRole::Audio),
            "video" => Some(StreamRole::Video),
            "subtitle" => Some(StreamRole::Subtitle),
            _ => None,
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamRole::Audio => "audio",
            StreamRole::Video => "video",
            StreamRole::Subtitle => "subtitle",
        };
        write!(f, "{}", name)
    }
}

/// One acceptable output codec for a stream, with its extra flags
#[derive(Debug, Clone, PartialEq)]
pub struct CodecChoice {
    pub name: String,
    /// Extra encoder flags, only used when actually encoding
    pub flags: Vec<String>,
    /// Extra container flags added when this codec is selected
    pub format_flags: Vec<String>,
}

impl CodecChoice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: vec![],
            format_flags: vec![],
        }
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }
}

/// One stream of a target format
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSpec {
    pub media: StreamRole,
    /// Stream specifier inside the chosen input, e.g. `a:0`
    pub specifier: String,
    /// Codecs in priority order, never empty once loaded
    pub codecs: Vec<CodecChoice>,
    /// Skip the stream instead of failing when no source has it
    pub optional: bool,
}

impl StreamSpec {
    pub fn new(media: StreamRole, specifier: impl Into<String>, codecs: Vec<CodecChoice>) -> Self {
        Self {
            media,
            specifier: specifier.into(),
            codecs,
            optional: false,
        }
    }

    /// Codec names as a priority set
    pub fn codec_names(&self) -> PrioritySet {
        self.codecs.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn codec(&self, name: &str) -> Option<&CodecChoice> {
        self.codecs.iter().find(|c| c.name == name)
    }
}

/// Header to write in front of the encoder output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepend {
    Id3v2,
}
/// User-facing output format: a container and its streams
/// User-facing output format: container, streams and codecs
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFormat {
    pub name: String,
    /// Acceptable container names, the first one is passed to the encoder
    pub formats: PrioritySet,
    pub ext: String,
    pub mime_type: String,
    pub streams: Vec<StreamSpec>,
    pub format_flags: Vec<String>,
    pub prepend: Option<Prepend>,
}

impl TargetFormat {
    /// Encoder container name
    pub fn container(&self) -> &str {
        self.formats.first().unwrap_or(self.name.as_str())
    }

    pub fn stream(&self, role: StreamRole) -> Option<&StreamSpec> {
        self.streams.iter().find(|s| s.media == role)
    }
}

/// All configured target formats plus the codec rename table
#[derive(Debug, Clone, Default)]
pub struct FormatCatalog {
    formats: Vec<TargetFormat>,
    codec_map: BTreeMap<String, String>,
}

impl FormatCatalog {
    pub fn new(formats: Vec<TargetFormat>, codec_map: BTreeMap<String, String>) -> Self {
        Self { formats, codec_map }
    }

    /// Find a format by name
    pub fn find(&self, name: &str) -> Option<&TargetFormat> {
        self.formats.iter().find(|f| f.name == name)
    }

    pub fn formats(&self) -> &[TargetFormat] {
        &self.formats
    }

    /// Name the encoder accepts for a declared codec name
    pub fn encoder_codec_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.codec_map.get(name).map(String::as_str).unwrap_or(name)
    }
}

/// Codec a source advertises for one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredCodec {
    /// Extractor says the role is not present (`"none"`)
    Absent,
    /// Field missing, the stream may or may not carry the role
    Unknown,
    Known(String),
}

/// Map extractor codec strings (`mp4a.40.2`, `avc1.64001F`, ...) to plain codec names
pub fn normalize_codec(raw: &str) -> String {
    const PREFIXES: &[(&str, &str)] = &[
        ("mp4a", "aac"),
        ("avc1", "h264"),
        ("avc3", "h264"),
        ("hev1", "hevc"),
        ("hvc1", "hevc"),
        ("vp09", "vp9"),
        ("vp9", "vp9"),
        ("vp8", "vp8"),
        ("av01", "av1"),
        ("opus", "opus"),
        ("vorbis", "vorbis"),
        ("mp3", "mp3"),
        ("flac", "flac"),
        ("ac-3", "ac3"),
        ("ec-3", "eac3"),
    ];

    let lower = raw.trim().to_lowercase();
    PREFIXES
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, name)| name.to_string())
        .unwrap_or(lower)
}

/// Stream advertised by the extraction tool
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceStream {
    pub format_id: String,
    pub protocol: Option<String>,
    pub ext: Option<String>,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    /// Audio bitrate, kbit/s
    pub abr: Option<f64>,
    /// Video bitrate, kbit/s
    pub vbr: Option<f64>,
    /// Total bitrate, kbit/s
    pub tbr: Option<f64>,
}

impl SourceStream {
    pub fn new(format_id: impl Into<String>) -> Self {
        Self {
            format_id: format_id.into(),
            ..Default::default()
        }
    }

    /// Declared codec for a role. Subtitles are never carried by media formats.
    pub fn codec(&self, role: StreamRole) -> DeclaredCodec {
        let raw = match role {
            StreamRole::Audio => self.acodec.as_deref(),
            StreamRole::Video => self.vcodec.as_deref(),
            StreamRole::Subtitle => return DeclaredCodec::Absent,
        };
        match raw {
            None => DeclaredCodec::Unknown,
            Some(c) if c.is_empty() || c == "none" => DeclaredCodec::Absent,
            Some(c) => DeclaredCodec::Known(normalize_codec(c)),
        }
    }

    pub fn has_role(&self, role: StreamRole) -> bool {
        self.codec(role) != DeclaredCodec::Absent
    }

    /// Per-role bitrate, 0 when not declared
    pub fn bitrate(&self, role: StreamRole) -> f64 {
        match role {
            StreamRole::Audio => self.abr,
            StreamRole::Video => self.vbr,
            StreamRole::Subtitle => None,
        }
        .unwrap_or(0.0)
    }

    pub fn total_bitrate(&self) -> f64 {
        self.tbr.unwrap_or(0.0)
    }
}

/// Extractor document describing one media item
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub upload_date: Option<String>,
    pub ext: Option<String>,
    pub formats: Vec<SourceStream>,
    /// The document exactly as the extractor produced it
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl MediaInfo {
    /// Build from the extractor's JSON document
    pub fn from_document(document: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut info: MediaInfo = serde_json::from_value(document.clone())?;
        if info.formats.is_empty() {
            // Single-format documents carry the format fields at the top level
            let single: SourceStream = serde_json::from_value(document.clone())?;
            if !single.format_id.is_empty() {
                info.formats.push(single);
            }
        }
        info.raw = document;
        Ok(info)
    }

    pub fn source(&self, format_id: &str) -> Option<&SourceStream> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }
}

/// Tag metadata written into the output container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub comment: Option<String>,
    pub date: Option<String>,
}

type TagField = for<'a> fn(&'a Metadata) -> Option<&'a str>;

fn title(m: &Metadata) -> Option<&str> {
    m.title.as_deref()
}

fn artist(m: &Metadata) -> Option<&str> {
    m.artist.as_deref()
}

fn album(m: &Metadata) -> Option<&str> {
    m.album.as_deref()
}

fn comment(m: &Metadata) -> Option<&str> {
    m.comment.as_deref()
}

fn date(m: &Metadata) -> Option<&str> {
    m.date.as_deref()
}

impl Metadata {
    /// Field to encoder tag key
    const TAG_TABLE: &'static [(&'static str, TagField)] = &[
        ("title", title),
        ("artist", artist),
        ("album", album),
        ("comment", comment),
        ("date", date),
    ];

    pub fn from_media_info(info: &MediaInfo) -> Self {
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());
        Self {
            title: Some(info.title.clone()).filter(|t| !t.is_empty()),
            artist: non_empty(&info.artist).or_else(|| non_empty(&info.uploader)),
            album: non_empty(&info.album),
            comment: non_empty(&info.webpage_url),
            date: info
                .upload_date
                .as_deref()
                .filter(|d| d.chars().count() >= 4)
                .map(|d| d.chars().take(4).collect()),
        }
    }

    /// Non-empty fields as key/value pairs in table order
    pub fn tags(&self) -> Vec<(String, String)> {
        Self::TAG_TABLE
            .iter()
            .filter_map(|(key, field)| field(self).map(|v| (key.to_string(), v.to_string())))
            .collect()
    }
}
