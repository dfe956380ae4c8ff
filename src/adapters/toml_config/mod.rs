// TOML config adapter - Format catalog and settings files

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::model::{CodecChoice, FormatCatalog, Prepend, StreamRole, StreamSpec, TargetFormat};
use crate::domain::priority::PrioritySet;
use crate::error::{GatewayError, GatewayResult};

/// Catalog shipped with the binary
pub const DEFAULT_CATALOG: &str = include_str!("../../../config/formats.toml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    #[serde(default)]
    codec_map: BTreeMap<String, String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFormat {
    name: String,
    formats: Vec<String>,
    ext: String,
    mime_type: String,
    #[serde(default)]
    format_flags: Vec<String>,
    prepend: Option<String>,
    #[serde(default)]
    streams: Vec<RawStream>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStream {
    media: StreamRole,
    specifier: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    codecs: Vec<RawCodec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCodec {
    name: String,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    format_flags: Vec<String>,
}

fn invalid(message: String) -> GatewayError {
    GatewayError::ConfigurationError { message }
}

/// Parse and validate a format catalog
pub fn parse_catalog(text: &str) -> GatewayResult<FormatCatalog> {
    let raw: RawCatalog =
        toml::from_str(text).map_err(|e| invalid(format!("Failed to parse format catalog: {}", e)))?;

    let mut names = BTreeSet::new();
    let mut formats = Vec::with_capacity(raw.formats.len());
    for format in raw.formats {
        if format.name.is_empty() {
            return Err(invalid("Format with an empty name".to_string()));
        }
        if !names.insert(format.name.clone()) {
            return Err(invalid(format!("Format {} is defined more than once", format.name)));
        }
        formats.push(convert_format(format)?);
    }

    for (from, to) in &raw.codec_map {
        if from.is_empty() || to.is_empty() {
            return Err(invalid(format!("Empty codec_map entry {:?} = {:?}", from, to)));
        }
    }

    Ok(FormatCatalog::new(formats, raw.codec_map))
}

fn convert_format(raw: RawFormat) -> GatewayResult<TargetFormat> {
    let name = raw.name;
    let containers = PrioritySet::new(raw.formats.into_iter().filter(|f| !f.is_empty()));
    if containers.is_empty() {
        return Err(invalid(format!("Format {} lists no containers", name)));
    }
    if raw.streams.is_empty() {
        return Err(invalid(format!("Format {} has no streams", name)));
    }

    let prepend = match raw.prepend.as_deref() {
        None => None,
        Some("id3v2") => Some(Prepend::Id3v2),
        Some(other) => {
            return Err(invalid(format!("Format {} has unknown prepend {:?}", name, other)));
        }
    };

    let mut roles = BTreeSet::new();
    let mut streams = Vec::with_capacity(raw.streams.len());
    for stream in raw.streams {
        if !roles.insert(stream.media) {
            return Err(invalid(format!("Format {} has more than one {} stream", name, stream.media)));
        }
        if stream.codecs.is_empty() {
            return Err(invalid(format!("Format {} lists no {} codecs", name, stream.media)));
        }
        if stream.media == StreamRole::Subtitle && !stream.optional {
            // Extractor formats never advertise subtitles
            return Err(invalid(format!("Format {} must mark its subtitle stream optional", name)));
        }

        let mut codecs: Vec<CodecChoice> = Vec::with_capacity(stream.codecs.len());
        for codec in stream.codecs {
            if codec.name.is_empty() {
                return Err(invalid(format!("Format {} has an unnamed {} codec", name, stream.media)));
            }
            if codecs.iter().any(|c| c.name == codec.name) {
                continue;
            }
            codecs.push(CodecChoice {
                name: codec.name,
                flags: codec.flags,
                format_flags: codec.format_flags,
            });
        }

        let specifier = stream
            .specifier
            .unwrap_or_else(|| format!("{}:0", stream.media.letter()));
        let mut spec = StreamSpec::new(stream.media, specifier, codecs);
        spec.optional = stream.optional;
        streams.push(spec);
    }

    Ok(TargetFormat {
        name,
        formats: containers,
        ext: raw.ext,
        mime_type: raw.mime_type,
        streams,
        format_flags: raw.format_flags,
        prepend,
    })
}

/// Read and validate a catalog file
pub fn load_catalog(path: &Path) -> GatewayResult<FormatCatalog> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| invalid(format!("Failed to read format catalog {}: {}", path.display(), e)))?;
    parse_catalog(&text)
}

/// The built-in catalog
pub fn default_catalog() -> GatewayResult<FormatCatalog> {
    parse_catalog(DEFAULT_CATALOG)
}

/// Settings as written in a config file; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub ytdlp: Option<String>,
    pub ffmpeg: Option<String>,
    pub ffprobe: Option<String>,
    pub probe_bytes: Option<u64>,
    pub catalog: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Parse a settings file
pub fn parse_settings(text: &str) -> GatewayResult<SettingsFile> {
    toml::from_str(text).map_err(|e| invalid(format!("Failed to parse TOML config: {}", e)))
}

/// Read a settings file
pub fn load_settings(path: &Path) -> GatewayResult<SettingsFile> {
    if !path.exists() {
        return Err(invalid(format!("Config file does not exist: {}", path.display())));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| invalid(format!("Failed to read config file {}: {}", path.display(), e)))?;
    parse_settings(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_loads() {
        let catalog = default_catalog().unwrap();

        let mp3 = catalog.find("mp3").unwrap();
        assert_eq!(mp3.container(), "mp3");
        assert_eq!(mp3.prepend, Some(Prepend::Id3v2));
        assert_eq!(mp3.stream(StreamRole::Audio).unwrap().specifier, "a:0");
        assert_eq!(catalog.encoder_codec_name("mp3"), "libmp3lame");

        let webm = catalog.find("webm").unwrap();
        assert_eq!(webm.streams.len(), 2);
        assert_eq!(
            webm.stream(StreamRole::Video).unwrap().codec_names().first(),
            Some("vp9")
        );
    }

    #[test]
    fn test_specifier_defaults_from_role() {
        let catalog = parse_catalog(
            r#"
            [[formats]]
            name = "mkv"
            formats = ["matroska"]
            ext = "mkv"
            mime_type = "video/x-matroska"

            [[formats.streams]]
            media = "video"
            [[formats.streams.codecs]]
            name = "h264"

            [[formats.streams]]
            media = "subtitle"
            optional = true
            [[formats.streams.codecs]]
            name = "webvtt"
            "#,
        )
        .unwrap();

        let mkv = catalog.find("mkv").unwrap();
        assert_eq!(mkv.stream(StreamRole::Video).unwrap().specifier, "v:0");
        assert!(mkv.stream(StreamRole::Subtitle).unwrap().optional);
    }

    #[test]
    fn test_catalog_validation() {
        let duplicate = r#"
            [[formats]]
            name = "a"
            formats = ["mp3"]
            ext = "mp3"
            mime_type = "audio/mpeg"
            [[formats.streams]]
            media = "audio"
            [[formats.streams.codecs]]
            name = "mp3"

            [[formats]]
            name = "a"
            formats = ["mp3"]
            ext = "mp3"
            mime_type = "audio/mpeg"
            [[formats.streams]]
            media = "audio"
            [[formats.streams.codecs]]
            name = "mp3"
        "#;
        let no_codecs = r#"
            [[formats]]
            name = "a"
            formats = ["mp3"]
            ext = "mp3"
            mime_type = "audio/mpeg"
            [[formats.streams]]
            media = "audio"
        "#;
        let bad_prepend = r#"
            [[formats]]
            name = "a"
            formats = ["mp3"]
            ext = "mp3"
            mime_type = "audio/mpeg"
            prepend = "apev2"
            [[formats.streams]]
            media = "audio"
            [[formats.streams.codecs]]
            name = "mp3"
        "#;
        let no_containers = r#"
            [[formats]]
            name = "a"
            formats = []
            ext = "mp3"
            mime_type = "audio/mpeg"
            [[formats.streams]]
            media = "audio"
            [[formats.streams.codecs]]
            name = "mp3"
        "#;

        for text in [duplicate, no_codecs, bad_prepend, no_containers, "formats = 3"] {
            assert!(matches!(
                parse_catalog(text),
                Err(GatewayError::ConfigurationError { .. })
            ));
        }
    }

    #[test]
    fn test_settings_file() {
        let settings = parse_settings("ffmpeg = \"/opt/ffmpeg\"\nprobe_bytes = 4096\n").unwrap();
        assert_eq!(settings.ffmpeg.as_deref(), Some("/opt/ffmpeg"));
        assert_eq!(settings.probe_bytes, Some(4096));
        assert_eq!(settings.ytdlp, None);

        assert!(parse_settings("colour = \"blue\"").is_err());
    }

    #[test]
    fn test_load_settings_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_settings(&dir.path().join("mediagate.toml"));
        assert!(matches!(result, Err(GatewayError::ConfigurationError { .. })));
    }
}
