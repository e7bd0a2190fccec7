//! `portable-python inspect` command

use anyhow::Result;

use crate::cli::InspectArgs;
use portable_python::ops::PythonInspector;
use portable_python::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, args: InspectArgs) -> Result<()> {
    let shell = super::shell(ctx);
    let effects = super::effects(ctx, &shell);
    let verbose = args.so.then_some(true);

    let mut reports = Vec::with_capacity(args.pythons.len());
    for python in &args.pythons {
        let inspector = PythonInspector::inspect(python, args.modules.as_deref(), effects.as_ref())?;
        reports.push(inspector.report(verbose));
    }
    println!("{}", reports.join("\n\n"));
    Ok(())
}
