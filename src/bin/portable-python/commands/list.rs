//! `portable-python list` command

use anyhow::Result;

use crate::cli::ListArgs;
use portable_python::ops::list_versions;

pub fn execute(args: ListArgs) -> Result<()> {
    println!("{}", list_versions(&args.family));
    Ok(())
}
