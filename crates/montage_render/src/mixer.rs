use montage_core::types::{AudioTrackDescriptor, TimeUs};
use std::path::PathBuf;

/// Filter label carrying the mixed audio.
pub const MIX_LABEL: &str = "[mixa]";

/// Where the encoder gets its audio from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioRoute {
    /// No tracks: the output carries video only.
    Silent,
    /// Every track looped and summed into one stream, cut at `total`.
    Mixed { inputs: Vec<PathBuf>, total: TimeUs },
}

/// Flat mix of background tracks for a single merge.
///
/// Tracks play for as long as the encoder runs: each input is looped and the
/// mix is trimmed to the render duration, so the route is torn down together
/// with the encoder process.
pub struct AudioMixer;

impl AudioMixer {
    pub fn mix(tracks: &[AudioTrackDescriptor], total: TimeUs) -> AudioRoute {
        if tracks.is_empty() {
            return AudioRoute::Silent;
        }
        tracing::debug!(tracks = tracks.len(), total = %total, "mixing audio");
        AudioRoute::Mixed {
            inputs: tracks.iter().map(|t| t.source.clone()).collect(),
            total,
        }
    }
}

impl AudioRoute {
    pub fn is_silent(&self) -> bool {
        matches!(self, AudioRoute::Silent)
    }

    pub fn input_count(&self) -> usize {
        match self {
            AudioRoute::Silent => 0,
            AudioRoute::Mixed { inputs, .. } => inputs.len(),
        }
    }

    /// ffmpeg input arguments, one looped input per track.
    pub fn input_args(&self) -> Vec<String> {
        let AudioRoute::Mixed { inputs, .. } = self else {
            return vec![];
        };
        inputs
            .iter()
            .flat_map(|path| {
                [
                    "-stream_loop".to_string(),
                    "-1".to_string(),
                    "-i".to_string(),
                    path.to_string_lossy().to_string(),
                ]
            })
            .collect()
    }

    /// Filter graph producing [`MIX_LABEL`]. Track inputs are numbered from
    /// `first_input`.
    pub fn filter_graph(&self, first_input: usize) -> Option<String> {
        let AudioRoute::Mixed { inputs, total } = self else {
            return None;
        };
        let labels: String = (0..inputs.len())
            .map(|i| format!("[{}:a]", first_input + i))
            .collect();
        let trim = format!("atrim=end={:.6},asetpts=PTS-STARTPTS", total.as_seconds());

        Some(if inputs.len() == 1 {
            format!("{labels}{trim}{MIX_LABEL}")
        } else {
            format!(
                "{labels}amix=inputs={}:duration=longest:dropout_transition=0,{trim}{MIX_LABEL}",
                inputs.len()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(n: usize) -> Vec<AudioTrackDescriptor> {
        (0..n)
            .map(|i| AudioTrackDescriptor::new(format!("/music/track{i}.mp3")))
            .collect()
    }

    #[test]
    fn no_tracks_is_silent() {
        let route = AudioMixer::mix(&[], TimeUs::from_seconds(9.5));
        assert!(route.is_silent());
        assert!(route.input_args().is_empty());
        assert_eq!(route.filter_graph(1), None);
    }

    #[test]
    fn three_tracks_share_one_destination() {
        let route = AudioMixer::mix(&tracks(3), TimeUs::from_seconds(9.5));
        assert_eq!(route.input_count(), 3);

        let args = route.input_args();
        assert_eq!(args.iter().filter(|a| *a == "-stream_loop").count(), 3);
        assert_eq!(args[3], "/music/track0.mp3");

        let graph = route.filter_graph(1).unwrap();
        assert_eq!(
            graph,
            "[1:a][2:a][3:a]amix=inputs=3:duration=longest:dropout_transition=0,\
             atrim=end=9.500000,asetpts=PTS-STARTPTS[mixa]"
        );
        assert_eq!(graph.matches(MIX_LABEL).count(), 1);
    }

    #[test]
    fn single_track_skips_amix() {
        let route = AudioMixer::mix(&tracks(1), TimeUs::from_seconds(5.0));
        let graph = route.filter_graph(1).unwrap();
        assert!(!graph.contains("amix"));
        assert!(graph.starts_with("[1:a]atrim=end=5.000000"));
    }
}
