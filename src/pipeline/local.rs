//! In-process pipeline engine
//!
//! `LocalEngine` keeps the stage graph as plain data until the first start,
//! then hands a compiled copy to one long-lived real-time thread that owns
//! every processor until shutdown. All later commands, parameters and
//! triggers travel to that thread over a channel, and lifecycle callbacks
//! fire from it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use log::{debug, error, info, warn};

use crate::config::{OutputKind, Pacing};
use crate::dsp::{
    ByteSink, Deinterleave, DiscardSink, Duplicator, FadeIn, FadeOut, FileWriter, Flow,
    FormatAdapter, GainProcessor, Interleave, PassThrough, Processor, StreamIn,
};
use crate::engine::{AudioBlock, LinkFormat, SampleFormat};
use crate::error::EngineError;
use crate::pipeline::engine::{
    LinkSpec, PipelineEngine, Port, StageId, StageKind, StageParameter, StageTrigger, StopReason,
    TransportCallbacks,
};

// ============================================================================
// Commands
// ============================================================================

/// Messages to the real-time thread
enum Command {
    Start,
    Stop,
    Parameter(StageId, StageParameter),
    Trigger(StageId, StageTrigger),
    Callbacks(Arc<dyn TransportCallbacks>),
    Shutdown,
}

struct Worker {
    commands: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

// ============================================================================
// Engine
// ============================================================================

/// Reference engine running the graph on a dedicated thread
///
/// # Example
/// ```
/// use kplay::config::Pacing;
/// use kplay::pipeline::{LocalEngine, PipelineEngine, StageKind};
///
/// let mut engine = LocalEngine::new(Pacing::FreeRunning);
/// assert!(engine.create_stage(StageKind::PitchTempo).is_err());
/// assert!(engine.create_stage(StageKind::PassThrough).is_ok());
/// ```
pub struct LocalEngine {
    pacing: Pacing,
    stages: BTreeMap<StageId, StageKind>,
    links: Vec<LinkSpec>,
    next_id: usize,
    /// Parameters set before the thread exists, replayed on spawn
    pending: Vec<Command>,
    callbacks: Option<Arc<dyn TransportCallbacks>>,
    worker: Option<Worker>,
}

impl LocalEngine {
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            stages: BTreeMap::new(),
            links: Vec::new(),
            next_id: 0,
            pending: Vec::new(),
            callbacks: None,
            worker: None,
        }
    }

    /// Number of live stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn kind(&self, stage: StageId) -> Result<&StageKind, EngineError> {
        self.stages.get(&stage).ok_or(EngineError::UnknownStage(stage))
    }

    fn ensure_unlocked(&self) -> Result<(), EngineError> {
        match self.worker {
            Some(_) => Err(EngineError::GraphLocked),
            None => Ok(()),
        }
    }

    fn check_port(&self, port: Port, output: bool) -> Result<&StageKind, EngineError> {
        let kind = self.kind(port.stage)?;
        let (inputs, outputs) = kind.ports();
        let (count, direction) = if output {
            (outputs, "output")
        } else {
            (inputs, "input")
        };
        if port.index >= count {
            return Err(EngineError::InvalidPort {
                stage: port.stage,
                direction,
                port: port.index,
            });
        }
        Ok(kind)
    }

    fn send(&mut self, command: Command) -> Result<(), EngineError> {
        match &self.worker {
            Some(worker) => worker
                .commands
                .send(command)
                .map_err(|_| EngineError::WorkerGone),
            None => {
                self.pending.push(command);
                Ok(())
            }
        }
    }

    fn spawn_worker(&mut self) -> Result<(), EngineError> {
        let graph = compile(&self.stages, &self.links)?;
        let (commands, receiver) = channel::unbounded();
        let (ready_tx, ready_rx) = channel::bounded(1);
        let callbacks = self.callbacks.clone();
        let pacing = self.pacing;

        let handle = thread::Builder::new()
            .name("kplay-rt".into())
            .spawn(move || {
                let runtime = match Runtime::new(graph, callbacks, pacing) {
                    Ok(runtime) => {
                        let _ = ready_tx.send(Ok(()));
                        runtime
                    }
                    Err(reason) => {
                        let _ = ready_tx.send(Err(reason));
                        return;
                    }
                };
                runtime.run(receiver);
            })
            .map_err(|e| EngineError::StartFailed {
                reason: format!("cannot spawn real-time thread: {e}"),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                let _ = handle.join();
                return Err(EngineError::StartFailed { reason });
            }
            Err(_) => {
                let _ = handle.join();
                return Err(EngineError::WorkerGone);
            }
        }

        for command in self.pending.drain(..) {
            let _ = commands.send(command);
        }
        info!("[ENGINE] real-time thread running {} stages", self.stages.len());
        self.worker = Some(Worker {
            commands,
            handle: Some(handle),
        });
        Ok(())
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new(Pacing::default())
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PipelineEngine for LocalEngine {
    fn create_stage(&mut self, kind: StageKind) -> Result<StageId, EngineError> {
        self.ensure_unlocked()?;
        match &kind {
            StageKind::PitchTempo => {
                return Err(EngineError::StageUnavailable {
                    stage: kind.name(),
                })
            }
            StageKind::Output(output) if output.is_device() && !cfg!(feature = "device-output") => {
                return Err(EngineError::StageUnavailable {
                    stage: kind.name(),
                })
            }
            StageKind::Gain { channels } if !(1..=2).contains(channels) => {
                return Err(EngineError::StageUnavailable {
                    stage: kind.name(),
                })
            }
            _ => {}
        }
        self.next_id += 1;
        let id = StageId(self.next_id);
        debug!("[ENGINE] created {} {:?}", id, kind);
        self.stages.insert(id, kind);
        Ok(id)
    }

    fn remove_stage(&mut self, stage: StageId) -> Result<(), EngineError> {
        self.ensure_unlocked()?;
        self.stages
            .remove(&stage)
            .ok_or(EngineError::UnknownStage(stage))?;
        self.links
            .retain(|link| link.from.stage != stage && link.to.stage != stage);
        Ok(())
    }

    fn link(&mut self, link: LinkSpec) -> Result<(), EngineError> {
        self.ensure_unlocked()?;
        let upstream = self.check_port(link.from, true)?;
        accepts(upstream, true, &link.format).map_err(|reason| EngineError::IncompatibleLink {
            reason: format!("{} output {}: {}", upstream.name(), link.from.index, reason),
        })?;
        let downstream = self.check_port(link.to, false)?;
        accepts(downstream, false, &link.format).map_err(|reason| {
            EngineError::IncompatibleLink {
                reason: format!("{} input {}: {}", downstream.name(), link.to.index, reason),
            }
        })?;
        if self
            .links
            .iter()
            .any(|existing| existing.to == link.to || existing.from == link.from)
        {
            return Err(EngineError::IncompatibleLink {
                reason: format!("port already linked ({} -> {})", link.from.stage, link.to.stage),
            });
        }
        self.links.push(link);
        Ok(())
    }

    fn set_parameter(
        &mut self,
        stage: StageId,
        parameter: StageParameter,
    ) -> Result<(), EngineError> {
        let kind = self.kind(stage)?;
        match (kind, parameter) {
            (StageKind::Gain { channels }, StageParameter::Gain { port, value })
                if port < *channels && value.is_finite() && value >= 0.0 => {}
            _ => {
                return Err(EngineError::ParameterRejected {
                    stage,
                    reason: format!("{} does not accept {:?}", kind.name(), parameter),
                })
            }
        }
        self.send(Command::Parameter(stage, parameter))
    }

    fn trigger(&mut self, stage: StageId, trigger: StageTrigger) -> Result<(), EngineError> {
        let kind = self.kind(stage)?;
        if !matches!(kind, StageKind::FadeOut { .. }) {
            return Err(EngineError::ParameterRejected {
                stage,
                reason: format!("{} has no {:?} trigger", kind.name(), trigger),
            });
        }
        if self.worker.is_none() {
            return Err(EngineError::ParameterRejected {
                stage,
                reason: "engine is not running".to_string(),
            });
        }
        self.send(Command::Trigger(stage, trigger))
    }

    fn set_callbacks(&mut self, callbacks: Arc<dyn TransportCallbacks>) {
        self.callbacks = Some(Arc::clone(&callbacks));
        if let Some(worker) = &self.worker {
            let _ = worker.commands.send(Command::Callbacks(callbacks));
        }
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.worker.is_none() {
            self.spawn_worker()?;
        }
        self.send(Command::Start)
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        match self.worker {
            Some(_) => self.send(Command::Stop),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        let _ = worker.commands.send(Command::Shutdown);
        if let Some(handle) = worker.handle.take() {
            if handle.join().is_err() {
                error!("[ENGINE] real-time thread panicked");
            }
        }
        debug!("[ENGINE] shut down");
    }
}

// ============================================================================
// Format acceptance
// ============================================================================

/// Whether one side of a stage accepts `format`
fn accepts(kind: &StageKind, output: bool, format: &LinkFormat) -> Result<(), String> {
    if format.sample_rate == 0 || format.frame_size == 0 {
        return Err("zero sample rate or frame size".to_string());
    }
    if !(1..=2).contains(&format.channels) {
        return Err(format!("{} channels", format.channels));
    }
    let float = format.sample_format == SampleFormat::F32;
    let need = |ok: bool, what: &str| {
        if ok {
            Ok(())
        } else {
            Err(format!("expects {what}, got {format}"))
        }
    };

    match kind {
        StageKind::StreamIn { source } => {
            let native = source.format();
            need(
                format.sample_rate == native.sample_rate
                    && format.sample_format == native.native_format()
                    && format.channels == native.channels.count(),
                "the source's native format",
            )
        }
        StageKind::FadeIn { .. }
        | StageKind::FormatAdapter
        | StageKind::PassThrough
        | StageKind::Duplicator => Ok(()),
        StageKind::Deinterleave => {
            let channels = if output { 1 } else { 2 };
            need(float && format.channels == channels, "float, 2ch in / 1ch out")
        }
        StageKind::Interleave => {
            let channels = if output { 2 } else { 1 };
            need(float && format.channels == channels, "float, 1ch in / 2ch out")
        }
        StageKind::Gain { .. } => need(float && format.channels == 1, "mono float"),
        StageKind::FadeOut { .. } | StageKind::PitchTempo => need(float, "float"),
        StageKind::FileWriter { .. } | StageKind::Output(_) => need(!float, "integer PCM"),
    }
}

// ============================================================================
// Compiled graph
// ============================================================================

/// A stage with its resolved link formats, ready to instantiate
struct Blueprint {
    id: StageId,
    kind: StageKind,
    inputs: Vec<LinkFormat>,
    outputs: Vec<Option<LinkFormat>>,
}

struct CompiledGraph {
    /// Topological order
    stages: Vec<Blueprint>,
    /// (stage, output port) -> (stage, input port)
    routes: HashMap<(StageId, usize), (StageId, usize)>,
    period: Duration,
}

fn start_failed(reason: String) -> EngineError {
    EngineError::StartFailed { reason }
}

/// Resolve link formats and a run order
fn compile(
    stages: &BTreeMap<StageId, StageKind>,
    links: &[LinkSpec],
) -> Result<CompiledGraph, EngineError> {
    let mut inputs: HashMap<StageId, Vec<Option<LinkFormat>>> = HashMap::new();
    let mut outputs: HashMap<StageId, Vec<Option<LinkFormat>>> = HashMap::new();
    for (id, kind) in stages {
        let (ins, outs) = kind.ports();
        inputs.insert(*id, vec![None; ins]);
        outputs.insert(*id, vec![None; outs]);
    }

    let mut routes = HashMap::new();
    let mut indegree: HashMap<StageId, usize> = stages.keys().map(|id| (*id, 0)).collect();
    for link in links {
        if let Some(slot) = inputs.get_mut(&link.to.stage).and_then(|v| v.get_mut(link.to.index)) {
            *slot = Some(link.format);
        }
        if let Some(slot) = outputs
            .get_mut(&link.from.stage)
            .and_then(|v| v.get_mut(link.from.index))
        {
            *slot = Some(link.format);
        }
        routes.insert(
            (link.from.stage, link.from.index),
            (link.to.stage, link.to.index),
        );
        *indegree.entry(link.to.stage).or_default() += 1;
    }

    // Kahn's algorithm, lowest id first for a stable order
    let mut ready: VecDeque<StageId> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.make_contiguous().sort();
    let mut order = Vec::with_capacity(stages.len());
    while let Some(id) = ready.pop_front() {
        order.push(id);
        for link in links.iter().filter(|link| link.from.stage == id) {
            if let Some(degree) = indegree.get_mut(&link.to.stage) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(link.to.stage);
                }
            }
        }
    }
    if order.len() != stages.len() {
        return Err(start_failed("stage graph has a cycle".to_string()));
    }

    let mut period = None;
    let mut blueprints = Vec::with_capacity(order.len());
    for id in order {
        let kind = stages[&id].clone();
        let resolved_inputs = inputs
            .remove(&id)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(port, format)| {
                format.ok_or_else(|| start_failed(format!("{} input {} is not linked", kind.name(), port)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let resolved_outputs = outputs.remove(&id).unwrap_or_default();

        if let StageKind::StreamIn { .. } = kind {
            if let Some(Some(format)) = resolved_outputs.first() {
                period = Some(Duration::from_secs_f64(
                    format.frame_size as f64 / format.sample_rate as f64,
                ));
            }
        }
        blueprints.push(Blueprint {
            id,
            kind,
            inputs: resolved_inputs,
            outputs: resolved_outputs,
        });
    }

    let period = period.ok_or_else(|| start_failed("graph has no linked ingest stage".to_string()))?;
    Ok(CompiledGraph {
        stages: blueprints,
        routes,
        period,
    })
}

// ============================================================================
// Real-time thread
// ============================================================================

struct Node {
    id: StageId,
    processor: Box<dyn Processor>,
    slots: Vec<Option<AudioBlock>>,
}

struct Runtime {
    nodes: Vec<Node>,
    index: HashMap<StageId, usize>,
    routes: HashMap<(StageId, usize), (StageId, usize)>,
    callbacks: Option<Arc<dyn TransportCallbacks>>,
    pacing: Pacing,
    period: Duration,
    clocked: bool,
    running: bool,
    deadline: Instant,
}

fn instantiate(blueprint: &Blueprint, period: Duration) -> Result<Box<dyn Processor>, String> {
    let first_in = blueprint.inputs.first().copied();
    let first_out = blueprint.outputs.first().copied().flatten();
    let format = first_in
        .or(first_out)
        .ok_or_else(|| format!("{} is not linked", blueprint.kind.name()))?;

    let processor: Box<dyn Processor> = match &blueprint.kind {
        StageKind::StreamIn { source } => {
            Box::new(StreamIn::new(Arc::clone(source), format.frame_size))
        }
        StageKind::FadeIn { duration } => Box::new(FadeIn::new(*duration, format.sample_rate)),
        StageKind::FormatAdapter => {
            let output = first_out.ok_or("format adapter output is not linked")?;
            if first_in.map(|f| f.channels) != Some(output.channels) {
                return Err("format adapter cannot change the channel count".to_string());
            }
            Box::new(FormatAdapter::new(output.sample_format))
        }
        StageKind::Deinterleave => Box::new(Deinterleave),
        StageKind::Gain { channels } => Box::new(GainProcessor::new(*channels)),
        StageKind::Interleave => Box::new(Interleave),
        StageKind::PassThrough => Box::new(PassThrough),
        StageKind::PitchTempo => return Err("pitch-tempo is not available".to_string()),
        StageKind::FadeOut { duration } => Box::new(FadeOut::new(*duration, format.sample_rate)),
        StageKind::Duplicator => Box::new(Duplicator),
        StageKind::FileWriter { path } => Box::new(
            FileWriter::create(path, format.sample_rate, format.channels, format.sample_format)
                .map_err(|e| format!("cannot create {}: {}", path.display(), e))?,
        ),
        StageKind::Output(OutputKind::Stdout) => Box::new(ByteSink::new(format.sample_format)),
        StageKind::Output(OutputKind::Null) => Box::new(DiscardSink::default()),
        StageKind::Output(_) => open_device(format, period)?,
    };
    Ok(processor)
}

#[cfg(feature = "device-output")]
fn open_device(format: LinkFormat, period: Duration) -> Result<Box<dyn Processor>, String> {
    crate::dsp::DeviceSink::open(format.sample_rate, period)
        .map(|sink| Box::new(sink) as Box<dyn Processor>)
        .map_err(|e| format!("cannot open audio device: {e}"))
}

#[cfg(not(feature = "device-output"))]
fn open_device(_format: LinkFormat, _period: Duration) -> Result<Box<dyn Processor>, String> {
    Err("built without audio device support".to_string())
}

impl Runtime {
    fn new(
        graph: CompiledGraph,
        callbacks: Option<Arc<dyn TransportCallbacks>>,
        pacing: Pacing,
    ) -> Result<Self, String> {
        let mut nodes = Vec::with_capacity(graph.stages.len());
        let mut index = HashMap::new();
        for blueprint in &graph.stages {
            let processor = instantiate(blueprint, graph.period)?;
            index.insert(blueprint.id, nodes.len());
            nodes.push(Node {
                id: blueprint.id,
                processor,
                slots: vec![None; blueprint.inputs.len()],
            });
        }
        let clocked = nodes.iter().any(|node| node.processor.is_clocked());

        Ok(Self {
            nodes,
            index,
            routes: graph.routes,
            callbacks,
            pacing,
            period: graph.period,
            clocked,
            running: false,
            deadline: Instant::now(),
        })
    }

    fn run(mut self, commands: Receiver<Command>) {
        'outer: loop {
            if !self.running {
                match commands.recv() {
                    Ok(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
                continue;
            }

            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if !self.handle(command) {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }
            if !self.running {
                continue;
            }

            match self.run_period() {
                Ok(Flow::Continue) => self.pace(),
                Ok(Flow::EndOfStream) => self.end_run(StopReason::EndOfStream),
                Ok(Flow::FadeComplete) => self.end_run(StopReason::UserRequested),
                Err(e) => {
                    error!("[ENGINE] processing failed: {}", e);
                    self.end_run(StopReason::UserRequested);
                }
            }
        }

        for node in &mut self.nodes {
            if let Err(e) = node.processor.finish() {
                warn!("[ENGINE] {} did not close cleanly: {}", node.processor.name(), e);
            }
        }
    }

    /// Apply one command; false means shut down
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start => {
                if !self.running {
                    for node in &mut self.nodes {
                        node.processor.rearm();
                    }
                    self.running = true;
                    self.deadline = Instant::now();
                    if let Some(callbacks) = &self.callbacks {
                        callbacks.on_started();
                    }
                }
            }
            Command::Stop => {
                if self.running {
                    self.end_run(StopReason::UserRequested);
                }
            }
            Command::Parameter(stage, parameter) => {
                if let Some(&i) = self.index.get(&stage) {
                    self.nodes[i].processor.set_parameter(parameter);
                }
            }
            Command::Trigger(stage, trigger) => {
                if let Some(&i) = self.index.get(&stage) {
                    self.nodes[i].processor.trigger(trigger);
                }
            }
            Command::Callbacks(callbacks) => self.callbacks = Some(callbacks),
            Command::Shutdown => return false,
        }
        true
    }

    fn end_run(&mut self, reason: StopReason) {
        self.running = false;
        for node in &mut self.nodes {
            node.slots.iter_mut().for_each(|slot| *slot = None);
        }
        debug!("[ENGINE] run ended: {:?}", reason);
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_stopped(reason);
        }
    }

    /// Pull one period through every stage in order
    fn run_period(&mut self) -> std::io::Result<Flow> {
        let mut flow = Flow::Continue;
        for i in 0..self.nodes.len() {
            let node = &mut self.nodes[i];
            let inputs = node
                .slots
                .iter_mut()
                .enumerate()
                .map(|(port, slot)| {
                    slot.take().ok_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("{} input {} received nothing", node.id, port),
                        )
                    })
                })
                .collect::<std::io::Result<Vec<_>>>()?;

            let outputs = node.processor.process(inputs)?;
            match node.processor.flow() {
                Flow::EndOfStream => return Ok(Flow::EndOfStream),
                Flow::FadeComplete => flow = Flow::FadeComplete,
                Flow::Continue => {}
            }

            let id = node.id;
            for (port, block) in outputs.into_iter().enumerate() {
                if let Some((to, to_port)) = self.routes.get(&(id, port)) {
                    if let Some(&j) = self.index.get(to) {
                        if let Some(slot) = self.nodes[j].slots.get_mut(*to_port) {
                            *slot = Some(block);
                        }
                    }
                }
            }
        }
        Ok(flow)
    }

    fn pace(&mut self) {
        if self.pacing == Pacing::FreeRunning || self.clocked {
            return;
        }
        self.deadline += self.period;
        let now = Instant::now();
        if self.deadline > now {
            thread::sleep(self.deadline - now);
        } else if now - self.deadline > self.period * 4 {
            // Fell far behind; resynchronize instead of bursting
            self.deadline = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioFormatDescriptor, BitDepth, ChannelLayout, FrameSource, ReadOutcome};
    use std::io;

    struct Silence;

    impl FrameSource for Silence {
        fn format(&self) -> AudioFormatDescriptor {
            AudioFormatDescriptor::new(8_000, BitDepth::Sixteen, ChannelLayout::Mono)
        }
        fn read(&self, _buffer: &mut [u8], _frames: usize) -> io::Result<ReadOutcome> {
            Ok(ReadOutcome::EndOfStream)
        }
        fn seek_to_begin(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn link(format: LinkFormat, from: StageId, to: StageId) -> LinkSpec {
        LinkSpec {
            format,
            from: Port::new(from, 0),
            to: Port::new(to, 0),
        }
    }

    #[test]
    fn test_pitch_tempo_is_unavailable() {
        let mut engine = LocalEngine::new(Pacing::FreeRunning);
        assert_eq!(
            engine.create_stage(StageKind::PitchTempo),
            Err(EngineError::StageUnavailable { stage: "pitch-tempo" })
        );
    }

    #[test]
    fn test_link_rejects_wrong_format() {
        let mut engine = LocalEngine::new(Pacing::FreeRunning);
        let source = Arc::new(Silence);
        let native = source.format();
        let ingest = engine
            .create_stage(StageKind::StreamIn { source })
            .unwrap();
        let gain = engine.create_stage(StageKind::Gain { channels: 1 }).unwrap();

        // Gain only takes float
        let pcm = native.link_format(SampleFormat::S16, 1);
        let err = engine.link(link(pcm, ingest, gain)).unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleLink { .. }));

        // Ingest only emits its native format
        let float = native.link_format(SampleFormat::F32, 1);
        assert!(engine.link(link(float, ingest, gain)).is_err());
        assert_eq!(engine.link_count(), 0);
    }

    #[test]
    fn test_ports_are_checked() {
        let mut engine = LocalEngine::new(Pacing::FreeRunning);
        let adapter = engine.create_stage(StageKind::FormatAdapter).unwrap();
        let sink = engine.create_stage(StageKind::Output(OutputKind::Null)).unwrap();
        let format = Silence.format().link_format(SampleFormat::S16, 1);

        let bad = LinkSpec {
            format,
            from: Port::new(sink, 0),
            to: Port::new(adapter, 0),
        };
        assert!(matches!(
            engine.link(bad),
            Err(EngineError::InvalidPort { direction: "output", .. })
        ));
        engine.link(link(format, adapter, sink)).unwrap();
        assert!(engine.link(link(format, adapter, sink)).is_err());
    }

    #[test]
    fn test_remove_stage_drops_its_links() {
        let mut engine = LocalEngine::new(Pacing::FreeRunning);
        let a = engine.create_stage(StageKind::PassThrough).unwrap();
        let b = engine.create_stage(StageKind::Output(OutputKind::Null)).unwrap();
        let format = Silence.format().link_format(SampleFormat::S16, 1);
        engine.link(link(format, a, b)).unwrap();

        engine.remove_stage(b).unwrap();
        assert_eq!(engine.stage_count(), 1);
        assert_eq!(engine.link_count(), 0);
        assert_eq!(engine.remove_stage(b), Err(EngineError::UnknownStage(b)));
    }

    #[test]
    fn test_start_requires_linked_inputs() {
        let mut engine = LocalEngine::new(Pacing::FreeRunning);
        engine.create_stage(StageKind::Output(OutputKind::Null)).unwrap();
        assert!(matches!(engine.start(), Err(EngineError::StartFailed { .. })));
    }

    #[test]
    fn test_gain_parameter_validation() {
        let mut engine = LocalEngine::new(Pacing::FreeRunning);
        let gain = engine.create_stage(StageKind::Gain { channels: 2 }).unwrap();
        assert!(engine
            .set_parameter(gain, StageParameter::Gain { port: 1, value: 0.5 })
            .is_ok());
        assert!(engine
            .set_parameter(gain, StageParameter::Gain { port: 2, value: 0.5 })
            .is_err());
        assert!(engine.set_parameter(gain, StageParameter::Pitch(1.0)).is_err());
    }
}
