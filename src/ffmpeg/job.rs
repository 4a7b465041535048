//! Job sequencing against the shared engine.
//!
//! A job is one input staged into engine storage, one or two executions, a
//! collected output, and a cleanup sweep. The engine is serial and
//! non-reentrant; the runner issues strictly sequential awaited calls and
//! there is no cancellation once an execution starts. Any execution failure
//! short-circuits the remaining passes; the staged input and intermediate
//! artifacts are still removed best-effort.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::{
    DiagnosticEvent, DiagnosticSink, EngineEvent, EventKind, ExecutionEngine, Subscription, emit,
};
use crate::error::ConvertError;
use crate::settings::{ControlMode, EncodeSettings};

use super::budget::{BitrateBudget, allocate_bitrate};
use super::builder::{
    build_clip_args, build_pass1_args, build_pass2_args, build_quality_args,
    build_remove_audio_args, display_command, format_args_for_display_multiline,
};
use super::probe::FileMetadata;

/// Pass-statistics artifacts the engine leaves behind after a two-pass run.
const PASS_LOG: &str = "ffmpeg2pass-0.log";
const PASS_LOG_MBTREE: &str = "ffmpeg2pass-0.log.mbtree";

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Staged,
    Pass1,
    Pass2,
    Collected,
    Cleaned,
    Completed,
    Failed,
}

/// Result of a completed job: output bytes plus the name to save them under.
#[derive(Debug)]
pub struct JobOutput {
    pub suggested_name: String,
    pub bytes: Vec<u8>,
    /// Present for size-mode jobs; `impossible` is the advisory overshoot
    /// warning from the allocator.
    pub budget: Option<BitrateBudget>,
}

/// Engine storage names for one job. The job id keeps names collision-free
/// across sequential jobs sharing the process-lifetime namespace.
struct JobNames {
    staged: String,
    output: String,
    pass1_null: String,
    suggested: String,
}

fn stem_of(input_name: &str) -> &str {
    match input_name.rfind('.') {
        Some(idx) if idx > 0 => &input_name[..idx],
        _ => input_name,
    }
}

impl JobNames {
    fn new(job_id: u64, input_name: &str, suggested: String) -> Self {
        Self {
            staged: format!("job{}-{}", job_id, input_name),
            output: format!("job{}-{}", job_id, suggested),
            pass1_null: format!("job{}-pass1-null.mp4", job_id),
            suggested,
        }
    }
}

/// Sequences one conversion against the engine. At most one runner may be
/// mid-flight per process; that contract is enforced by the `Converter`
/// job gate, not by the engine.
pub struct JobRunner<'e, E: ExecutionEngine> {
    engine: &'e E,
    sink: Option<DiagnosticSink>,
    state: JobState,
    job_id: u64,
}

impl<'e, E: ExecutionEngine> JobRunner<'e, E> {
    pub fn new(engine: &'e E, sink: Option<DiagnosticSink>) -> Self {
        Self {
            engine,
            sink,
            state: JobState::Idle,
            job_id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run a full conversion: stage, one or two passes, collect, clean.
    pub async fn run(
        &mut self,
        settings: &EncodeSettings,
        input_name: &str,
        input_bytes: &[u8],
        metadata: &FileMetadata,
    ) -> Result<JobOutput, ConvertError> {
        let suggested = format!("{}_conv.{}", stem_of(input_name), settings.format.ext());
        let names = JobNames::new(self.job_id, input_name, suggested);
        let two_pass = settings.effective_mode() == ControlMode::Size;

        let result = self.run_passes(settings, &names, input_bytes, metadata).await;
        self.finish(&names, two_pass, result).await
    }

    /// Run a single stream-copy execution (audio removal, clipping) through
    /// the same stage/collect/clean path as a quality encode.
    pub async fn run_stream_copy(
        &mut self,
        input_name: &str,
        input_bytes: &[u8],
        job: StreamCopyJob<'_>,
    ) -> Result<JobOutput, ConvertError> {
        let ext = match input_name.rfind('.') {
            Some(idx) => &input_name[idx..],
            None => "",
        };
        let suggested = format!("{}{}{}", stem_of(input_name), job.name_suffix(), ext);
        let names = JobNames::new(self.job_id, input_name, suggested);

        let result = async {
            self.stage(&names, input_bytes).await?;
            let args = job.args(&names.staged, &names.output);
            self.exec_step(&args, JobState::Pass2).await?;
            self.collect(&names).await
        }
        .await;
        self.finish(&names, false, result).await
    }

    async fn run_passes(
        &mut self,
        settings: &EncodeSettings,
        names: &JobNames,
        input_bytes: &[u8],
        metadata: &FileMetadata,
    ) -> Result<(Vec<u8>, Option<BitrateBudget>), ConvertError> {
        self.stage(names, input_bytes).await?;

        match settings.effective_mode() {
            ControlMode::Quality => {
                self.info(format!(
                    "Start: Quality Mode (CRF {})",
                    settings.effective_crf()
                ));
                self.info("Encoding (CRF Mode)...");
                let args = build_quality_args(settings, &names.staged, &names.output);
                self.exec_step(&args, JobState::Pass2).await?;
                let bytes = self.collect(names).await?;
                Ok((bytes, None))
            }
            ControlMode::Size => {
                let audio_kbps = settings.effective_audio_kbps();
                let budget = allocate_bitrate(
                    settings.target_mb,
                    metadata.duration,
                    audio_kbps,
                    settings.video_floor_kbps,
                );
                self.info(format!(
                    "Start: 2-Pass Mode. Target Video: {}k, Audio: {}k",
                    budget.video_target_kbps, audio_kbps
                ));
                if budget.impossible {
                    self.info(format!(
                        "WARNING: Minimum floors exceed target size. Expect output > {}MB.",
                        settings.target_mb
                    ));
                }

                self.info("Pass 1/2: Analysis...");
                let pass1 = build_pass1_args(
                    settings,
                    &names.staged,
                    budget.video_target_kbps,
                    &names.pass1_null,
                );
                self.exec_step(&pass1, JobState::Pass1).await?;
                let _ = self.engine.delete_file(&names.pass1_null).await;

                self.info("Pass 2/2: Encoding...");
                let pass2 = build_pass2_args(
                    settings,
                    &names.staged,
                    &names.output,
                    budget.video_target_kbps,
                    audio_kbps,
                );
                self.exec_step(&pass2, JobState::Pass2).await?;

                let bytes = self.collect(names).await?;
                Ok((bytes, Some(budget)))
            }
        }
    }

    async fn stage(&mut self, names: &JobNames, input_bytes: &[u8]) -> Result<(), ConvertError> {
        self.engine.write_file(&names.staged, input_bytes).await?;
        self.state = JobState::Staged;
        Ok(())
    }

    /// One engine execution with log/progress forwarding scoped to the call.
    async fn exec_step(&mut self, args: &[String], next: JobState) -> Result<(), ConvertError> {
        self.info(format!("Executing: {}", display_command(args)));
        log::debug!(
            target: "mediaconv::ffmpeg::job",
            "job {} args:\n{}",
            self.job_id,
            format_args_for_display_multiline(args)
        );

        let result = {
            let _subs = self.scoped_forwarders();
            self.engine.exec(args).await
        };
        result?;
        self.state = next;
        Ok(())
    }

    async fn collect(&mut self, names: &JobNames) -> Result<Vec<u8>, ConvertError> {
        let bytes = match self.engine.read_file(&names.output).await {
            Ok(bytes) => bytes,
            // The execution reported success, so an absent output is an
            // engine contract violation, not an encoding error.
            Err(ConvertError::NotFound(_)) => {
                return Err(ConvertError::OutputMissing(names.output.clone()));
            }
            Err(other) => return Err(other),
        };
        self.state = JobState::Collected;
        Ok(bytes)
    }

    /// Best-effort sweep of everything the job staged or produced. Failures
    /// are swallowed; the job always reaches `Cleaned`.
    async fn clean(&mut self, names: &JobNames, two_pass: bool) {
        let _ = self.engine.delete_file(&names.staged).await;
        let _ = self.engine.delete_file(&names.output).await;
        if two_pass {
            let _ = self.engine.delete_file(&names.pass1_null).await;
            let _ = self.engine.delete_file(PASS_LOG).await;
            let _ = self.engine.delete_file(PASS_LOG_MBTREE).await;
        }
        self.state = JobState::Cleaned;
    }

    /// Clean up, then settle into a terminal state.
    async fn finish<T: IntoJobOutput>(
        &mut self,
        names: &JobNames,
        two_pass: bool,
        result: Result<T, ConvertError>,
    ) -> Result<JobOutput, ConvertError> {
        self.clean(names, two_pass).await;

        match result {
            Ok(value) => {
                self.state = JobState::Completed;
                self.info("Complete");
                log::info!(
                    target: "mediaconv::ffmpeg::job",
                    "job {} completed: {}",
                    self.job_id,
                    names.suggested
                );
                Ok(value.into_job_output(names.suggested.clone()))
            }
            Err(e) => {
                self.state = JobState::Failed;
                emit(self.sink.as_ref(), DiagnosticEvent::error(e.to_string()));
                log::error!(
                    target: "mediaconv::ffmpeg::job",
                    "job {} failed: {}",
                    self.job_id,
                    e
                );
                Err(e)
            }
        }
    }

    fn info(&self, message: impl Into<String>) {
        emit(self.sink.as_ref(), DiagnosticEvent::info(message));
    }

    /// Forward engine log/progress events into the sink for the duration of
    /// one call. Dropped (and therefore detached) when the call settles.
    fn scoped_forwarders(&self) -> Vec<Subscription<'e, E>> {
        let Some(sink) = self.sink.clone() else {
            return Vec::new();
        };
        let log_sink = sink.clone();
        let log_sub = Subscription::attach(
            self.engine,
            EventKind::Log,
            Arc::new(move |event| {
                if let EngineEvent::Log { message } = event {
                    log_sink(DiagnosticEvent::info(message.clone()));
                }
            }),
        );
        let progress_sub = Subscription::attach(
            self.engine,
            EventKind::Progress,
            Arc::new(move |event| {
                if let EngineEvent::Progress { ratio } = event {
                    sink(DiagnosticEvent::progress(*ratio));
                }
            }),
        );
        vec![log_sub, progress_sub]
    }
}

/// Stream-copy operations that need no re-encode.
#[derive(Debug, Clone, Copy)]
pub enum StreamCopyJob<'a> {
    RemoveAudio,
    Clip { start: &'a str, end: &'a str },
}

impl StreamCopyJob<'_> {
    fn name_suffix(&self) -> &'static str {
        match self {
            StreamCopyJob::RemoveAudio => "_noaudio",
            StreamCopyJob::Clip { .. } => "_clipped",
        }
    }

    fn args(&self, input_name: &str, output_name: &str) -> Vec<String> {
        match self {
            StreamCopyJob::RemoveAudio => build_remove_audio_args(input_name, output_name),
            StreamCopyJob::Clip { start, end } => {
                build_clip_args(input_name, output_name, start, end)
            }
        }
    }
}

/// Lets `finish` accept both the encode result (bytes + budget) and the
/// stream-copy result (bytes only).
trait IntoJobOutput {
    fn into_job_output(self, suggested_name: String) -> JobOutput;
}

impl IntoJobOutput for (Vec<u8>, Option<BitrateBudget>) {
    fn into_job_output(self, suggested_name: String) -> JobOutput {
        JobOutput {
            suggested_name,
            bytes: self.0,
            budget: self.1,
        }
    }
}

impl IntoJobOutput for Vec<u8> {
    fn into_job_output(self, suggested_name: String) -> JobOutput {
        JobOutput {
            suggested_name,
            bytes: self,
            budget: None,
        }
    }
}
