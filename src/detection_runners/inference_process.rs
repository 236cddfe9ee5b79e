use std::time::Instant;
use crate::common::{Detection, DetectorError};
use crate::data::{RawOutputs, TimeCalc, X};
use crate::utils;

/// Stage slots recorded by [`InferenceProcess::run`].
pub const STAGE_PREPROCESS: usize = 0;
pub const STAGE_INFERENCE: usize = 1;
pub const STAGE_POSTPROCESS: usize = 2;

pub trait InferenceProcess {
    type Input;

    /// Pre-process the input data.
    fn preprocess(&mut self, x: &Self::Input) -> Result<X, DetectorError>;

    /// Executes the model on the preprocessed data.
    fn inference(&mut self, x: X) -> Result<RawOutputs, DetectorError>;

    /// Post-process the model's output.
    fn postprocess(&self, raw: RawOutputs) -> Result<Vec<Detection>, DetectorError>;

    /// Per-stage timings accumulated across runs.
    fn time_calc(&mut self) -> &mut TimeCalc;

    /// Executes the full pipeline.
    fn run(&mut self, x: &Self::Input) -> Result<Vec<Detection>, DetectorError> {
        let detect_time = Instant::now();
        let mut _detect_elapsed = detect_time.elapsed();

        let t_pre = Instant::now();
        let ys = self.preprocess(x)?;
        self.time_calc().add_or_push(STAGE_PREPROCESS, t_pre.elapsed());
        _detect_elapsed = utils::trace("TIME", "Preprocessing input", detect_time, _detect_elapsed);

        let t_exe = Instant::now();
        let ys = self.inference(ys)?;
        self.time_calc().add_or_push(STAGE_INFERENCE, t_exe.elapsed());
        _detect_elapsed = utils::trace("TIME", "Detection run", detect_time, _detect_elapsed);

        let t_post = Instant::now();
        let ys = self.postprocess(ys)?;
        self.time_calc().add_or_push(STAGE_POSTPROCESS, t_post.elapsed());
        utils::trace("TIME", "Postprocessing", detect_time, _detect_elapsed);

        Ok(ys)
    }

    fn print_time(&mut self) {
        let ts = self.time_calc();
        log::info!(
            "> Runs: {} | Preprocess: {:?} | Inference: {:?} | Postprocess: {:?} (avg)",
            ts.n(),
            ts.avg_i(STAGE_PREPROCESS),
            ts.avg_i(STAGE_INFERENCE),
            ts.avg_i(STAGE_POSTPROCESS),
        );
    }
}
