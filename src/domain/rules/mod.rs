// Domain rules - Source selection and codec negotiation

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::model::*;
use crate::domain::priority::PrioritySet;
use crate::error::{GatewayError, GatewayResult};

/// Passthrough codec name understood by the encoder
pub const COPY_CODEC: &str = "copy";

/// Per-role codecs the caller wants to force
#[derive(Debug, Clone, Default)]
pub struct CodecOverrides {
    roles: BTreeMap<StreamRole, PrioritySet>,
}

impl CodecOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the same codec names to every role. Each role only keeps what
    /// its target stream supports, see [`effective_preference`].
    pub fn for_all_roles<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = PrioritySet::new(names);
        let mut overrides = Self::default();
        if set.is_empty() {
            return overrides;
        }
        for role in [StreamRole::Audio, StreamRole::Video, StreamRole::Subtitle] {
            overrides.roles.insert(role, set.clone());
        }
        overrides
    }

    pub fn with_role(mut self, role: StreamRole, codecs: PrioritySet) -> Self {
        self.roles.insert(role, codecs);
        self
    }

    pub fn get(&self, role: StreamRole) -> Option<&PrioritySet> {
        self.roles.get(&role)
    }
}

/// Forced codecs restricted to the target's codecs, or the target's codecs
/// when that leaves nothing. A forced codec never widens the target.
pub fn effective_preference(spec: &StreamSpec, forced: Option<&PrioritySet>) -> PrioritySet {
    let target = spec.codec_names();
    match forced.map(|f| f.intersect(&target)) {
        Some(set) if !set.is_empty() => set,
        _ => target,
    }
}

fn prefers(source: &SourceStream, role: StreamRole, preference: &PrioritySet) -> bool {
    match source.codec(role) {
        DeclaredCodec::Known(codec) => preference.member(&codec),
        DeclaredCodec::Unknown | DeclaredCodec::Absent => false,
    }
}

/// Total order over candidate sources for one role. When no bitrates are
/// declared at all the format id decides, ascending.
fn compare_sources(
    a: &SourceStream,
    b: &SourceStream,
    role: StreamRole,
    preference: &PrioritySet,
) -> Ordering {
    prefers(b, role, preference)
        .cmp(&prefers(a, role, preference))
        .then_with(|| b.bitrate(role).total_cmp(&a.bitrate(role)))
        .then_with(|| b.total_bitrate().total_cmp(&a.total_bitrate()))
        .then_with(|| a.format_id.cmp(&b.format_id))
}

/// Sources exposing `role`, best first
pub fn rank_sources<'a>(
    role: StreamRole,
    preference: &PrioritySet,
    sources: &'a [SourceStream],
) -> Vec<&'a SourceStream> {
    let mut ranked: Vec<&SourceStream> = sources.iter().filter(|s| s.has_role(role)).collect();
    ranked.sort_by(|a, b| compare_sources(a, b, role, preference));
    ranked
}

pub fn choose_source<'a>(
    role: StreamRole,
    preference: &PrioritySet,
    sources: &'a [SourceStream],
) -> Option<&'a SourceStream> {
    rank_sources(role, preference, sources).into_iter().next()
}

/// Best source when no target format is requested: muxed sources first,
/// then total bitrate, then format id.
pub fn choose_best_source(sources: &[SourceStream]) -> Option<&SourceStream> {
    let muxed = |s: &SourceStream| s.has_role(StreamRole::Audio) && s.has_role(StreamRole::Video);
    sources.iter().min_by(|a, b| {
        muxed(b)
            .cmp(&muxed(a))
            .then_with(|| b.total_bitrate().total_cmp(&a.total_bitrate()))
            .then_with(|| a.format_id.cmp(&b.format_id))
    })
}

/// Source chosen for one stream of the target format
#[derive(Debug, Clone, PartialEq)]
pub struct StreamPlan {
    pub spec: StreamSpec,
    pub source_id: String,
    /// Forced codecs for this role, kept for the codec decision
    pub forced: Option<PrioritySet>,
}

/// Pick a source for every stream of `format`
pub fn plan_streams(
    format: &TargetFormat,
    sources: &[SourceStream],
    overrides: &CodecOverrides,
) -> GatewayResult<Vec<StreamPlan>> {
    let mut plans = Vec::with_capacity(format.streams.len());

    for spec in &format.streams {
        let forced = overrides.get(spec.media);
        let preference = effective_preference(spec, forced);
        match choose_source(spec.media, &preference, sources) {
            Some(source) => plans.push(StreamPlan {
                spec: spec.clone(),
                source_id: source.format_id.clone(),
                forced: forced.cloned(),
            }),
            None if spec.optional => continue,
            None => return Err(GatewayError::NoSuchStream { role: spec.media }),
        }
    }

    if plans.is_empty() {
        return Err(GatewayError::NegotiationError {
            message: format!("no source stream matches format {}", format.name),
        });
    }

    Ok(plans)
}

/// Output codec for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct CodecDecision {
    /// Encoder codec name, `copy` for passthrough
    pub codec: String,
    pub flags: Vec<String>,
    pub format_flags: Vec<String>,
}

impl CodecDecision {
    pub fn is_copy(&self) -> bool {
        self.codec == COPY_CODEC
    }
}

/// Decide the output codec once the source's real codec is known
pub fn choose_codec(
    spec: &StreamSpec,
    forced: Option<&PrioritySet>,
    probed_codec: Option<&str>,
    retranscode: bool,
    catalog: &FormatCatalog,
) -> GatewayResult<CodecDecision> {
    let target = spec.codec_names();
    let forced_in_target = forced.map(|f| f.intersect(&target)).unwrap_or_default();

    let name = forced_in_target
        .first()
        .or_else(|| probed_codec.filter(|p| target.member(p)))
        .or_else(|| target.first())
        .ok_or_else(|| GatewayError::NegotiationError {
            message: format!("no codec configured for {} stream", spec.media),
        })?;

    let choice = spec.codec(name).ok_or_else(|| GatewayError::NegotiationError {
        message: format!("codec {} not configured for {} stream", name, spec.media),
    })?;

    if !retranscode && probed_codec == Some(choice.name.as_str()) {
        return Ok(CodecDecision {
            codec: COPY_CODEC.to_string(),
            flags: vec![],
            format_flags: choice.format_flags.clone(),
        });
    }

    Ok(CodecDecision {
        codec: catalog.encoder_codec_name(&choice.name).to_string(),
        flags: choice.flags.clone(),
        format_flags: choice.format_flags.clone(),
    })
}

#[cfg(test)]
mod tests;
