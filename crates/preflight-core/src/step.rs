//! The `Step` contract every provider compiles its configuration into.
//! Represented as an abstract capability set (a trait object) rather
//! than a closed enum, the same choice the teacher makes for its
//! `Reporter`/`StateStore` traits: providers are added independently of
//! the scheduler, so dynamic dispatch over a handful of methods is the
//! right tradeoff against a tag-per-provider-kind enum.

use preflight_types::{
    CaptureFilter, CaptureItem, Diff, DoctorCheck, Explanation, LockInfo, Result, StepId, StepStatus,
};

use crate::context::{ExplainContext, RunContext};

/// A provider-compiled unit of work. `check` must be side-effect-free;
/// `apply` must be idempotent — re-running a step whose `check` already
/// reported `Satisfied` must be a no-op.
pub trait Step: Send + Sync {
    fn id(&self) -> &StepId;

    /// Ids this step must run after. Every id here must resolve within
    /// the same compile; the DAG builder rejects anything that doesn't.
    fn depends_on(&self) -> &[StepId];

    /// Reads current system state only; never mutates.
    fn check(&self, ctx: &RunContext<'_>) -> Result<StepStatus>;

    /// Computes what `apply` would do without doing it.
    fn plan(&self, ctx: &RunContext<'_>) -> Result<Diff>;

    /// Performs the change. Must be safe to call again after a `check`
    /// that reports `Satisfied`.
    fn apply(&self, ctx: &RunContext<'_>) -> Result<()>;

    /// Static human-readable text, independent of any live state.
    fn explain(&self, ctx: &ExplainContext) -> Explanation;

    /// The version currently installed, if this step's domain has one
    /// and the step can determine it cheaply.
    fn installed_version(&self, ctx: &RunContext<'_>) -> Result<Option<String>> {
        let _ = ctx;
        Ok(None)
    }

    /// Lockfile integration metadata, if this step's domain is
    /// lockable (packages, not dotfiles or OS preferences).
    fn lock_info(&self) -> Option<LockInfo> {
        None
    }

    /// Binaries this step's `apply` requires to be on `PATH`; consulted
    /// by `doctor`'s full-mode tool check.
    fn required_tools(&self) -> &[&str] {
        &[]
    }
}

/// A provider translates one config section into a list of `Step`s.
/// Providers are stateless; everything they do goes through the ports
/// exposed by `CompileContext`/`RunContext`.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn compile(&self, ctx: &crate::context::CompileContext<'_>) -> Result<Vec<Box<dyn Step>>>;

    /// Reads the live system into an inventory of items this provider
    /// owns. Optional: providers that have nothing meaningful to
    /// capture (OS preference toggles with no stable identity, say)
    /// may leave this at the default empty result.
    fn capture(&self, ctx: &RunContext<'_>, filter: &CaptureFilter) -> Result<Vec<CaptureItem>> {
        let _ = (ctx, filter);
        Ok(Vec::new())
    }

    /// Binaries (plus optional minimum versions) `doctor`'s full mode
    /// should verify are on `PATH`, independent of any single step.
    fn doctor_checks(&self) -> Vec<DoctorCheck> {
        Vec::new()
    }
}
