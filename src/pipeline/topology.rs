//! Declarative pipeline topology
//!
//! One table lists every stage role in signal order together with the
//! condition under which it is present. Links are derived from adjacent
//! present roles, so mono/stereo, fade-in and save-file combinations share
//! one wiring path instead of a branch per case.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OutputKind;
use crate::engine::{AudioFormatDescriptor, FrameSource, LinkFormat, SampleFormat};
use crate::pipeline::engine::StageKind;

// ============================================================================
// Roles
// ============================================================================

/// Position of a stage in the playback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageRole {
    Ingest,
    FadeIn,
    /// Native -> float adapter
    ToWorking,
    Deinterleave,
    Gain,
    Interleave,
    PitchTempo,
    FadeOut,
    /// Float -> native adapter
    ToNative,
    Duplicator,
    FileWriter,
    Output,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageRole::Ingest => "ingest",
            StageRole::FadeIn => "fade-in",
            StageRole::ToWorking => "to-working adapter",
            StageRole::Deinterleave => "deinterleave",
            StageRole::Gain => "gain",
            StageRole::Interleave => "interleave",
            StageRole::PitchTempo => "pitch/tempo",
            StageRole::FadeOut => "fade-out",
            StageRole::ToNative => "to-native adapter",
            StageRole::Duplicator => "duplicator",
            StageRole::FileWriter => "file writer",
            StageRole::Output => "output",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Always,
    WhenFadeIn,
    WhenStereo,
    WhenSaving,
}

/// Every role in signal order. The file writer hangs off the duplicator's
/// second port and is not part of the main chain.
const STAGE_TABLE: &[(StageRole, Presence)] = &[
    (StageRole::Ingest, Presence::Always),
    (StageRole::FadeIn, Presence::WhenFadeIn),
    (StageRole::ToWorking, Presence::Always),
    (StageRole::Deinterleave, Presence::WhenStereo),
    (StageRole::Gain, Presence::Always),
    (StageRole::Interleave, Presence::WhenStereo),
    (StageRole::PitchTempo, Presence::Always),
    (StageRole::FadeOut, Presence::Always),
    (StageRole::ToNative, Presence::Always),
    (StageRole::Duplicator, Presence::WhenSaving),
    (StageRole::Output, Presence::Always),
    (StageRole::FileWriter, Presence::WhenSaving),
];

// ============================================================================
// Session layout
// ============================================================================

/// The inputs that decide the graph shape
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLayout {
    pub format: AudioFormatDescriptor,
    pub output: OutputKind,
    pub save_path: Option<PathBuf>,
    pub fade_in: Option<Duration>,
    pub fade_out: Duration,
}

impl SessionLayout {
    fn includes(&self, presence: Presence) -> bool {
        match presence {
            Presence::Always => true,
            Presence::WhenFadeIn => self.fade_in.is_some(),
            Presence::WhenStereo => self.format.channels.is_stereo(),
            Presence::WhenSaving => self.save_path.is_some(),
        }
    }

    /// Present roles in creation order
    pub fn roles(&self) -> Vec<StageRole> {
        STAGE_TABLE
            .iter()
            .filter(|(_, presence)| self.includes(*presence))
            .map(|(role, _)| *role)
            .collect()
    }

    fn channels(&self) -> usize {
        self.format.channels.count()
    }
}

// ============================================================================
// Plan
// ============================================================================

/// A stage to create
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub role: StageRole,
    pub kind: StageKind,
}

/// A link to create, addressed by role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedLink {
    pub from: StageRole,
    pub from_port: usize,
    pub to: StageRole,
    pub to_port: usize,
    pub format: LinkFormat,
}

/// Complete description of a session graph, independent of any engine
#[derive(Debug, Clone)]
pub struct TopologyPlan {
    pub stages: Vec<PlannedStage>,
    pub links: Vec<PlannedLink>,
}

impl TopologyPlan {
    /// Derive the stages and links for `layout`
    ///
    /// # Arguments
    /// * `layout` - Source format and output selections
    /// * `source` - Reader the ingest stage pulls from
    pub fn new(layout: &SessionLayout, source: Arc<dyn FrameSource>) -> Self {
        let roles = layout.roles();
        let stages = roles
            .iter()
            .map(|role| PlannedStage {
                role: *role,
                kind: stage_kind(*role, layout, &source),
            })
            .collect();

        let chain: Vec<StageRole> = roles
            .iter()
            .copied()
            .filter(|role| *role != StageRole::FileWriter)
            .collect();

        let mut links = Vec::new();
        for pair in chain.windows(2) {
            links.extend(chain_links(layout, pair[0], pair[1]));
        }
        if roles.contains(&StageRole::FileWriter) {
            links.push(PlannedLink {
                from: StageRole::Duplicator,
                from_port: 1,
                to: StageRole::FileWriter,
                to_port: 0,
                format: native_link(layout),
            });
        }

        Self { stages, links }
    }

    pub fn roles(&self) -> Vec<StageRole> {
        self.stages.iter().map(|stage| stage.role).collect()
    }

    pub fn contains(&self, role: StageRole) -> bool {
        self.stages.iter().any(|stage| stage.role == role)
    }

    /// Links whose downstream end is `role`
    pub fn links_into(&self, role: StageRole) -> Vec<PlannedLink> {
        self.links
            .iter()
            .filter(|link| link.to == role)
            .copied()
            .collect()
    }
}

fn stage_kind(role: StageRole, layout: &SessionLayout, source: &Arc<dyn FrameSource>) -> StageKind {
    match role {
        StageRole::Ingest => StageKind::StreamIn {
            source: Arc::clone(source),
        },
        StageRole::FadeIn => StageKind::FadeIn {
            duration: layout.fade_in.unwrap_or_default(),
        },
        StageRole::ToWorking | StageRole::ToNative => StageKind::FormatAdapter,
        StageRole::Deinterleave => StageKind::Deinterleave,
        StageRole::Gain => StageKind::Gain {
            channels: layout.channels(),
        },
        StageRole::Interleave => StageKind::Interleave,
        StageRole::PitchTempo => StageKind::PitchTempo,
        StageRole::FadeOut => StageKind::FadeOut {
            duration: layout.fade_out,
        },
        StageRole::Duplicator => StageKind::Duplicator,
        // Only present when a path is set
        StageRole::FileWriter => StageKind::FileWriter {
            path: layout.save_path.clone().unwrap_or_default(),
        },
        StageRole::Output => StageKind::Output(layout.output),
    }
}

/// Whether `role` emits native-format samples
fn emits_native(role: StageRole) -> bool {
    matches!(
        role,
        StageRole::Ingest | StageRole::FadeIn | StageRole::ToNative | StageRole::Duplicator
    )
}

fn native_link(layout: &SessionLayout) -> LinkFormat {
    layout
        .format
        .link_format(layout.format.native_format(), layout.channels())
}

/// Links between two adjacent chain roles
///
/// Around the deinterleave/interleave pair the stream is split into one
/// mono link per channel, port to port.
fn chain_links(layout: &SessionLayout, from: StageRole, to: StageRole) -> Vec<PlannedLink> {
    let sample_format = if emits_native(from) {
        layout.format.native_format()
    } else {
        SampleFormat::F32
    };

    if from == StageRole::Deinterleave || to == StageRole::Interleave {
        let format = layout.format.link_format(sample_format, 1);
        (0..layout.channels())
            .map(|port| PlannedLink {
                from,
                from_port: port,
                to,
                to_port: port,
                format,
            })
            .collect()
    } else {
        vec![PlannedLink {
            from,
            from_port: 0,
            to,
            to_port: 0,
            format: layout.format.link_format(sample_format, layout.channels()),
        }]
    }
}
