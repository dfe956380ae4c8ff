//! Input/output deduplication and encoder argument building

use crate::engine::{Input, Output, StreamSession};

/// Distinct input, with the flags of the session that first referenced it
#[derive(Debug)]
pub(crate) struct DistinctInput {
    pub input: Input,
    pub flags: Vec<String>,
}

/// Sessions resolved against their distinct inputs and outputs
#[derive(Debug, Default)]
pub(crate) struct Layout {
    /// In first-reference order, which is also `-i` order
    pub inputs: Vec<DistinctInput>,
    pub outputs: Vec<Output>,
    /// Per session: input index of every map, then output index
    pub sessions: Vec<(Vec<usize>, usize)>,
}

impl Layout {
    pub fn new(sessions: &[StreamSession]) -> Self {
        let mut layout = Layout::default();

        for session in sessions {
            let map_inputs = session
                .maps
                .iter()
                .map(|map| match layout.inputs.iter().position(|d| d.input.same(&map.input)) {
                    Some(index) => index,
                    None => {
                        layout.inputs.push(DistinctInput {
                            input: map.input.clone(),
                            flags: session.input_flags.clone(),
                        });
                        layout.inputs.len() - 1
                    }
                })
                .collect();

            let output = match layout.outputs.iter().position(|o| o.same(&session.output)) {
                Some(index) => index,
                None => {
                    layout.outputs.push(session.output.clone());
                    layout.outputs.len() - 1
                }
            };

            layout.sessions.push((map_inputs, output));
        }

        layout
    }
}

/// Full encoder argument list. `input_urls` and `output_urls` are indexed
/// like `layout.inputs` and `layout.outputs`.
pub(crate) fn build_args(
    global_flags: &[String],
    sessions: &[StreamSession],
    layout: &Layout,
    input_urls: &[String],
    output_urls: &[String],
) -> Vec<String> {
    let mut args: Vec<String> = global_flags.to_vec();

    for (input, url) in layout.inputs.iter().zip(input_urls) {
        args.extend(input.flags.iter().cloned());
        args.push("-i".to_string());
        args.push(url.clone());
    }

    for (session, (map_inputs, output)) in sessions.iter().zip(&layout.sessions) {
        for (map, input_index) in session.maps.iter().zip(map_inputs) {
            args.push("-map".to_string());
            args.push(format!("{}:{}", input_index, map.specifier));
            args.push(map.codec.flag().to_string());
            args.push(map.codec.name().to_string());
            args.extend(map.codec_flags.iter().cloned());
        }

        args.push("-f".to_string());
        args.push(session.format.name.clone());
        args.extend(session.format.flags.iter().cloned());
        for (key, value) in &session.metadata {
            args.push("-metadata".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.extend(session.output_flags.iter().cloned());
        args.push(output_urls[*output].clone());
    }

    args
}
