// Unit tests for negotiation rules

use super::*;

fn audio_source(id: &str, acodec: &str, abr: f64) -> SourceStream {
    SourceStream {
        format_id: id.to_string(),
        acodec: Some(acodec.to_string()),
        vcodec: Some("none".to_string()),
        abr: Some(abr),
        tbr: Some(abr),
        ..Default::default()
    }
}

fn video_source(id: &str, vcodec: &str, vbr: f64) -> SourceStream {
    SourceStream {
        format_id: id.to_string(),
        acodec: Some("none".to_string()),
        vcodec: Some(vcodec.to_string()),
        vbr: Some(vbr),
        tbr: Some(vbr),
        ..Default::default()
    }
}

fn audio_format(name: &str, codecs: &[&str]) -> TargetFormat {
    TargetFormat {
        name: name.to_string(),
        formats: PrioritySet::new([name]),
        ext: name.to_string(),
        mime_type: "audio/test".to_string(),
        streams: vec![StreamSpec::new(
            StreamRole::Audio,
            "a:0",
            codecs.iter().map(|c| CodecChoice::new(*c)).collect(),
        )],
        format_flags: vec![],
        prepend: None,
    }
}

fn catalog() -> FormatCatalog {
    let mut codec_map = BTreeMap::new();
    codec_map.insert("mp3".to_string(), "libmp3lame".to_string());
    codec_map.insert("vorbis".to_string(), "libvorbis".to_string());
    FormatCatalog::new(vec![], codec_map)
}

#[test]
fn test_effective_preference_uses_override_inside_target() {
    let format = audio_format("ogg", &["vorbis", "opus"]);
    let forced = PrioritySet::new(["opus"]);
    let preference = effective_preference(&format.streams[0], Some(&forced));
    assert_eq!(preference.iter().collect::<Vec<_>>(), vec!["opus"]);
}

#[test]
fn test_effective_preference_falls_back_when_override_disjoint() {
    let format = audio_format("ogg", &["vorbis", "opus"]);
    let forced = PrioritySet::new(["mp3"]);
    let preference = effective_preference(&format.streams[0], Some(&forced));
    assert_eq!(preference.iter().collect::<Vec<_>>(), vec!["vorbis", "opus"]);
    assert!(!preference.member("mp3"));
}

#[test]
fn test_rank_prefers_members_then_bitrate() {
    let sources = vec![
        audio_source("140", "mp4a.40.2", 256.0),
        audio_source("250", "opus", 70.0),
        audio_source("251", "opus", 160.0),
        video_source("137", "avc1.640028", 4000.0),
    ];
    let preference = PrioritySet::new(["opus"]);

    let ranked: Vec<_> = rank_sources(StreamRole::Audio, &preference, &sources)
        .into_iter()
        .map(|s| s.format_id.as_str())
        .collect();
    assert_eq!(ranked, vec!["251", "250", "140"]);
}

#[test]
fn test_rank_ties_broken_by_format_id() {
    let sources = vec![
        SourceStream::new("b"),
        SourceStream::new("c"),
        SourceStream::new("a"),
    ];
    let preference = PrioritySet::new(["mp3"]);
    let best = choose_source(StreamRole::Audio, &preference, &sources).unwrap();
    assert_eq!(best.format_id, "a");
}

#[test]
fn test_selection_is_independent_of_input_order() {
    let sources = vec![
        audio_source("140", "mp4a.40.2", 128.0),
        audio_source("139", "mp4a.40.5", 128.0),
        audio_source("251", "opus", 128.0),
        audio_source("600", "opus", 128.0),
        video_source("137", "avc1.640028", 4000.0),
    ];
    let format = audio_format("m4a", &["aac"]);

    let mut permutations = vec![sources.clone()];
    let mut reversed = sources.clone();
    reversed.reverse();
    permutations.push(reversed);
    let mut rotated = sources.clone();
    rotated.rotate_left(2);
    permutations.push(rotated);

    let results: Vec<_> = permutations
        .iter()
        .map(|p| plan_streams(&format, p, &CodecOverrides::new()).unwrap())
        .collect();
    for plans in &results {
        assert_eq!(plans[0].source_id, "139");
        assert_eq!(plans, &results[0]);
    }
}

#[test]
fn test_plan_missing_required_role_fails() {
    let sources = vec![audio_source("140", "mp4a.40.2", 128.0)];
    let mut format = audio_format("mp4", &["aac"]);
    format.streams.push(StreamSpec::new(
        StreamRole::Video,
        "v:0",
        vec![CodecChoice::new("h264")],
    ));

    let err = plan_streams(&format, &sources, &CodecOverrides::new()).unwrap_err();
    assert!(matches!(err, GatewayError::NoSuchStream { role: StreamRole::Video }));
}

#[test]
fn test_plan_skips_optional_role() {
    let sources = vec![audio_source("140", "mp4a.40.2", 128.0)];
    let mut format = audio_format("mkv", &["aac"]);
    let mut subtitle = StreamSpec::new(StreamRole::Subtitle, "s:0", vec![CodecChoice::new("ass")]);
    subtitle.optional = true;
    format.streams.push(subtitle);

    let plans = plan_streams(&format, &sources, &CodecOverrides::new()).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].spec.media, StreamRole::Audio);
}

#[test]
fn test_mp3_source_is_copied() {
    let mut source = SourceStream::new("mp3");
    source.acodec = Some("mp3".to_string());
    source.vcodec = Some("h264".to_string());
    let format = TargetFormat {
        streams: vec![StreamSpec::new(
            StreamRole::Audio,
            "a:0",
            vec![CodecChoice::new("mp3").with_flags(["-b:a", "320k"])],
        )],
        ..audio_format("mp3", &[])
    };

    let plans = plan_streams(&format, &[source], &CodecOverrides::new()).unwrap();
    assert_eq!(plans[0].source_id, "mp3");

    let decision = choose_codec(&plans[0].spec, None, Some("mp3"), false, &catalog()).unwrap();
    assert!(decision.is_copy());
    assert!(decision.flags.is_empty());
}

#[test]
fn test_retranscode_never_copies() {
    let format = audio_format("mp3", &["mp3"]);
    let spec = &format.streams[0];
    let decision = choose_codec(spec, None, Some("mp3"), true, &catalog()).unwrap();
    assert_eq!(decision.codec, "libmp3lame");
}

#[test]
fn test_codec_prefers_probed_codec_in_target() {
    let format = audio_format("ogg", &["vorbis", "opus"]);
    let spec = &format.streams[0];

    let decision = choose_codec(spec, None, Some("opus"), false, &catalog()).unwrap();
    assert!(decision.is_copy());

    let decision = choose_codec(spec, None, Some("aac"), false, &catalog()).unwrap();
    assert_eq!(decision.codec, "libvorbis");
}

#[test]
fn test_codec_override_outside_target_is_ignored() {
    let format = audio_format("ogg", &["vorbis", "opus"]);
    let spec = &format.streams[0];
    let forced = PrioritySet::new(["mp3"]);

    let decision = choose_codec(spec, Some(&forced), Some("aac"), false, &catalog()).unwrap();
    assert_eq!(decision.codec, "libvorbis");
}

#[test]
fn test_codec_override_beats_probed_codec() {
    let format = audio_format("ogg", &["vorbis", "opus"]);
    let spec = &format.streams[0];
    let forced = PrioritySet::new(["vorbis"]);

    let decision = choose_codec(spec, Some(&forced), Some("opus"), false, &catalog()).unwrap();
    assert_eq!(decision.codec, "libvorbis");
}

#[test]
fn test_best_source_prefers_muxed() {
    let mut muxed = SourceStream::new("18");
    muxed.acodec = Some("mp4a.40.2".to_string());
    muxed.vcodec = Some("avc1.42001E".to_string());
    muxed.tbr = Some(500.0);
    let sources = vec![video_source("137", "avc1.640028", 4000.0), muxed];

    assert_eq!(choose_best_source(&sources).unwrap().format_id, "18");
    assert!(choose_best_source(&[]).is_none());
}
