//! `portable-python build` command

use anyhow::Result;

use crate::cli::BuildArgs;
use portable_python::builder::RealProbe;
use portable_python::ops::{BuildRequest, BuildSetup};
use portable_python::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, args: BuildArgs) -> Result<()> {
    let config = &ctx.config().build;

    // CLI > config > defaults
    let build_folder = args.build.unwrap_or_else(|| ctx.config().build_folder());
    let dist_folder = args.dist.unwrap_or_else(|| ctx.config().dist_folder());
    let static_libpython = if args.no_static {
        false
    } else {
        args.static_libpython || config.static_libpython
    };

    let request = BuildRequest {
        python_spec: args.python_spec,
        build_folder: ctx.resolve(&build_folder),
        dist_folder: ctx.resolve(&dist_folder),
        modules: args.modules.or_else(|| config.modules.clone()),
        prefix: args.prefix.or_else(|| config.prefix.clone()),
        static_libpython,
        target: args.target.or_else(|| config.target.clone()),
        jobs: args.jobs.or(config.jobs),
        x_debug: args.x_debug,
    };

    let setup = BuildSetup::new(&request, &RealProbe)?;
    let shell = super::shell(ctx);
    let effects = super::effects(ctx, &shell);
    setup.compile(effects.as_ref(), &shell)?;
    Ok(())
}
