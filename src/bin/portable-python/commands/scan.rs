//! `portable-python scan` command

use anyhow::Result;

use crate::cli::ScanArgs;
use portable_python::builder::RealProbe;
use portable_python::core::PythonSpec;
use portable_python::ops::scan;

pub fn execute(args: ScanArgs) -> Result<()> {
    let python = PythonSpec::parse(&args.python)?;
    let reports = scan(&python, &args.targets, &RealProbe)?;
    let rendered: Vec<String> = reports.iter().map(|r| r.render()).collect();
    println!("{}", rendered.join("\n\n"));
    Ok(())
}
