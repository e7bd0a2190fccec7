//! Command implementations

pub mod build;
pub mod completions;
pub mod inspect;
pub mod list;
pub mod scan;

use std::sync::Arc;
use std::time::Duration;

use portable_python::sources::Downloader;
use portable_python::util::{DryRunEffects, Effects, GlobalContext, RealEffects, Shell};

/// Shell honoring the global flags.
pub fn shell(ctx: &GlobalContext) -> Arc<Shell> {
    Arc::new(Shell::from_flags(ctx.is_verbose(), !ctx.color()))
}

/// Real or dry-run effects, per `--dryrun`.
pub fn effects(ctx: &GlobalContext, shell: &Arc<Shell>) -> Box<dyn Effects> {
    if ctx.is_dryrun() {
        return Box::new(DryRunEffects::new());
    }
    let net = &ctx.config().net;
    let downloader = Downloader::new(Arc::clone(shell))
        .offline(net.offline)
        .timeout(net.timeout.map(Duration::from_secs));
    Box::new(RealEffects::new(downloader))
}
