//! `stackline synth`: Compose, validate and write the cloud assembly.

use std::path::{Component, Path, PathBuf};

use clap::Args;
use stackline_common::config::StacklineConfig;
use stackline_common::constants;

use crate::output;

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Directory receiving templates, manifest and the staged image asset.
    #[arg(long, default_value = constants::DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,

    /// Overrides the configured build context.
    #[arg(long)]
    pub build_context: Option<PathBuf>,
}

/// Returns an exclude pattern anchored at the build context root when the
/// output directory lies inside the context.
fn context_exclude(out_dir: &Path, context: &Path) -> Option<String> {
    let out_dir = std::path::absolute(out_dir).ok()?;
    let context = std::path::absolute(context).ok()?;
    let inside = out_dir.strip_prefix(&context).ok()?;
    let mut parts = Vec::new();
    for component in inside.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("/{}", parts.join("/")))
}

/// Executes the `synth` command.
///
/// # Errors
///
/// Returns an error if composition, validation or writing fails.
pub fn execute(args: SynthArgs, mut config: StacklineConfig) -> anyhow::Result<()> {
    if let Some(context) = args.build_context {
        config.compute.build_context = context;
    }
    if let Some(pattern) = context_exclude(&args.out_dir, &config.compute.build_context) {
        if !config.compute.exclude.contains(&pattern) {
            tracing::debug!(pattern = %pattern, "excluding output directory from build context");
            config.compute.exclude.push(pattern);
        }
    }

    let composition = stackline_sdk::compose(&config)?;
    let assembly = composition.app.synthesize()?;
    let written = assembly.write_to(&args.out_dir)?;
    let staged = composition.compute.image.stage(&args.out_dir)?;
    tracing::info!(
        files = written.len() + 1,
        dir = %args.out_dir.display(),
        "synthesis complete"
    );

    println!("Synthesized to: {}", args.out_dir.display());
    println!("{}", output::rule(40));
    for path in written.iter().chain(std::iter::once(&staged)) {
        println!("  {}", path.display());
    }
    println!();
    println!("  Outputs:");
    for (name, value) in composition.outputs.iter() {
        println!("    {name:<16} {}", output::format_value(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_inside_context_is_excluded_from_the_root_only() {
        let context = Path::new("/work/app");
        assert_eq!(
            context_exclude(Path::new("/work/app/out"), context).as_deref(),
            Some("/out")
        );
        assert_eq!(
            context_exclude(Path::new("/work/app/build/assembly"), context).as_deref(),
            Some("/build/assembly")
        );
    }

    #[test]
    fn output_outside_context_adds_no_exclude() {
        let context = Path::new("/work/app");
        assert_eq!(context_exclude(Path::new("/tmp/out"), context), None);
        assert_eq!(context_exclude(context, context), None);
    }

    #[test]
    fn anchored_exclude_keeps_nested_directories_of_the_same_name() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::create_dir_all(dir.path().join("out")).expect("mkdir");
        std::fs::create_dir_all(dir.path().join("src/out")).expect("mkdir");
        std::fs::write(dir.path().join("out/stale.json"), "{}").expect("write");
        std::fs::write(dir.path().join("src/out/page.html"), "<p/>").expect("write");

        let pattern = context_exclude(&dir.path().join("out"), dir.path()).expect("inside");
        let ctx = stackline_image::BuildContext::open(dir.path(), &[pattern]).expect("open");
        let files: Vec<String> = ctx
            .files()
            .expect("files")
            .into_iter()
            .map(|f| f.relative)
            .collect();
        assert_eq!(files, vec!["src/out/page.html"]);
    }
}
