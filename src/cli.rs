// ============================================================================
// CanvasFE CLI — headless mask rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   canvasfe render -i scene.json -o mask.png
//   canvasfe render -i "scenes/*.json" --output-dir masks/ --preview
//   canvasfe render -i scene.json --region 0,0,256,256
//   canvasfe fingerprint -i a.json b.json
//   canvasfe migrate-ui ~/.config/canvasfe/ui_state.json --write

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use egui::{Rect, pos2, vec2};

use canvasfe::components::ui_state::{UiState, migrate_ui_state};
use canvasfe::error::{PersistError, SceneError};
use canvasfe::scene::{Scene, render_mask, save_png};
use canvasfe::settings::CanvasSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// CanvasFE headless mask renderer.
#[derive(Parser, Debug)]
#[command(
    name = "canvasfe",
    about = "CanvasFE headless inpaint mask renderer",
    long_about = "Render inpaint masks described by JSON scene files to PNG, print their\n\
                  content fingerprints, or migrate a persisted UI state file.\n\n\
                  Example:\n  \
                  canvasfe render -i scene.json -o mask.png\n  \
                  canvasfe render -i \"scenes/*.json\" --output-dir masks/"
)]
pub struct CliArgs {
    /// Print per-file timing information.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render every mask of each scene to a PNG.
    Render {
        /// Scene file(s). Glob patterns accepted (e.g. "scenes/*.json").
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<String>,

        /// Output file path. Only valid for single-file input.
        /// Scenes with several masks get a `_maskN` suffix per mask.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output directory for batch rendering.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Region of interest in stage pixels: x,y,width,height.
        #[arg(long, value_name = "X,Y,W,H", value_parser = parse_region)]
        region: Option<Rect>,

        /// Render the on-screen look (fill pattern, configured opacity)
        /// instead of the full-opacity mask.
        #[arg(long)]
        preview: bool,
    },

    /// Print the content fingerprint of every mask in each scene.
    Fingerprint {
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<String>,
    },

    /// Migrate a persisted UI state file to the current version.
    MigrateUi {
        /// File to migrate. Defaults to the platform UI state path.
        file: Option<PathBuf>,

        /// Overwrite the file instead of printing the result.
        #[arg(long)]
        write: bool,
    },
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the selected command and return an OS exit code.
/// `0` = everything succeeded, `1` = one or more inputs failed.
pub fn run(args: CliArgs, settings: &CanvasSettings) -> ExitCode {
    match args.command {
        Command::Render { input, output, output_dir, region, preview } => run_render(
            &input,
            output.as_deref(),
            output_dir.as_deref(),
            region,
            preview,
            settings,
            args.verbose,
        ),
        Command::Fingerprint { input } => run_fingerprint(&input, settings),
        Command::MigrateUi { file, write } => {
            let Some(path) = file.or_else(CanvasSettings::ui_state_path) else {
                eprintln!("error: no UI state file given and no platform config directory.");
                return ExitCode::FAILURE;
            };
            match run_migrate(&path, write) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {}: {}", path.display(), e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run_render(
    patterns:   &[String],
    output:     Option<&Path>,
    output_dir: Option<&Path>,
    region:     Option<Rect>,
    preview:    bool,
    settings:   &CanvasSettings,
    verbose:    bool,
) -> ExitCode {
    let inputs = resolve_inputs(patterns);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && output.is_some() && output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch rendering.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        match render_one(input_path, output, output_dir, region, preview, settings) {
            Ok(written) => {
                if verbose || multi {
                    for path in &written {
                        println!("  → {}", path.display());
                    }
                    println!("  ({:.0}ms)", file_start.elapsed().as_secs_f64() * 1000.0);
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file pipelines
// ============================================================================

fn render_one(
    input:      &Path,
    output:     Option<&Path>,
    output_dir: Option<&Path>,
    region:     Option<Rect>,
    preview:    bool,
    settings:   &CanvasSettings,
) -> Result<Vec<PathBuf>, SceneError> {
    let scene = Scene::load(input)?;
    let (manager, ids) = scene.build(settings.mask_defaults())?;

    let mut written = Vec::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        let Some(path) = build_output_path(input, output, output_dir, index, ids.len()) else {
            return Err(PersistError::InvalidFormat(format!(
                "cannot determine output path for '{}'",
                input.display()
            ))
            .into());
        };
        let img = render_mask(&manager, id, region, preview)?;
        save_png(&img, &path)?;
        written.push(path);
    }
    Ok(written)
}

fn run_fingerprint(patterns: &[String], settings: &CanvasSettings) -> ExitCode {
    let inputs = resolve_inputs(patterns);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let mut any_failure = false;
    for input in &inputs {
        let result = Scene::load(input)
            .map_err(SceneError::from)
            .and_then(|scene| scene.build(settings.mask_defaults()));
        match result {
            Ok((manager, ids)) => {
                for (index, id) in ids.iter().enumerate() {
                    match manager.content_hash(id) {
                        Ok(hash) => println!("{}\t{}\t{:016x}", input.display(), index, hash),
                        Err(e) => {
                            eprintln!("  error: {}", e);
                            any_failure = true;
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("error: {}: {}", input.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn run_migrate(path: &Path, write: bool) -> Result<(), PersistError> {
    let text = std::fs::read_to_string(path)?;
    let migrated = migrate_ui_state(serde_json::from_str(&text)?);
    // Reject files that would not load after migration.
    UiState::from_persisted(migrated.clone())?;

    let out = serde_json::to_string_pretty(&migrated)?;
    if write {
        std::fs::write(path, out)?;
        log::info!("migrated UI state written to {}", path.display());
    } else {
        println!("{}", out);
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse `x,y,w,h` into a stage rect.
fn parse_region(s: &str) -> Result<Rect, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{}': {}", p.trim(), e)))
        .collect::<Result<_, _>>()?;
    let &[x, y, w, h] = &parts[..] else {
        return Err(format!("expected x,y,width,height, got '{}'", s));
    };
    if !parts.iter().all(|v| v.is_finite()) {
        return Err(format!("region values must be finite, got '{}'", s));
    }
    if !(w > 0.0 && h > 0.0) {
        return Err("region width and height must be positive".into());
    }
    Ok(Rect::from_min_size(pos2(x, y), vec2(w, h)))
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for mask `index` of `count` in one scene.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, `.png`
fn build_output_path(
    input:      &Path,
    output:     Option<&Path>,
    output_dir: Option<&Path>,
    index:      usize,
    count:      usize,
) -> Option<PathBuf> {
    let suffix = if count > 1 { format!("_mask{}", index) } else { String::new() };

    if let Some(out) = output {
        if count <= 1 {
            return Some(out.to_path_buf());
        }
        let stem = out.file_stem()?.to_string_lossy().into_owned();
        let parent = out.parent().unwrap_or(Path::new(""));
        return Some(parent.join(format!("{}{}.png", stem, suffix)));
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let name = format!("{}{}.png", stem, suffix);

    if let Some(dir) = output_dir {
        return Some(dir.join(name));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(&name);
    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}{}_out.png", stem, suffix)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_parsing() {
        assert_eq!(
            parse_region("1, 2, 30, 40").unwrap(),
            Rect::from_min_max(pos2(1.0, 2.0), pos2(31.0, 42.0))
        );
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,0,4").is_err());
        assert!(parse_region("a,b,c,d").is_err());
        assert!(parse_region("0,0,inf,inf").is_err());
        assert!(parse_region("0,0,NaN,4").is_err());
        assert!(parse_region("-inf,0,4,4").is_err());
    }

    #[test]
    fn output_paths() {
        let input = Path::new("scenes/face.json");
        assert_eq!(build_output_path(input, None, None, 0, 1), Some(PathBuf::from("scenes/face.png")));
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out")), 2, 3),
            Some(PathBuf::from("out/face_mask2.png"))
        );
        assert_eq!(
            build_output_path(input, Some(Path::new("m.png")), None, 0, 1),
            Some(PathBuf::from("m.png"))
        );
        assert_eq!(
            build_output_path(input, Some(Path::new("dir/m.png")), None, 1, 2),
            Some(PathBuf::from("dir/m_mask1.png"))
        );
        assert_eq!(
            build_output_path(Path::new("x.png"), None, None, 0, 1),
            Some(PathBuf::from("x_out.png"))
        );
    }

    #[test]
    fn args_parse() {
        let args = CliArgs::try_parse_from(["canvasfe", "render", "-i", "a.json", "--region", "0,0,8,8", "--preview"])
            .unwrap();
        match args.command {
            Command::Render { input, region, preview, .. } => {
                assert_eq!(input, vec!["a.json".to_string()]);
                assert!(region.is_some());
                assert!(preview);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    const TWO_MASKS: &str = r#"{ "width": 16, "height": 16, "masks": [
        { "objects": [ { "type": "rect", "rect": { "min": { "x": 0, "y": 0 }, "max": { "x": 4, "y": 4 } } } ] },
        { "objects": [ { "type": "rect", "rect": { "min": { "x": 8, "y": 8 }, "max": { "x": 12, "y": 12 } } } ] }
    ] }"#;

    fn same_code(a: ExitCode, b: ExitCode) -> bool {
        format!("{:?}", a) == format!("{:?}", b)
    }

    #[test]
    fn render_writes_one_png_per_mask() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scene.json");
        std::fs::write(&input, TWO_MASKS).unwrap();
        let out_dir = dir.path().join("masks");

        let code = run_render(
            &[input.to_string_lossy().into_owned()],
            None,
            Some(&out_dir),
            None,
            false,
            &CanvasSettings::default(),
            false,
        );
        assert!(same_code(code, ExitCode::SUCCESS));

        let first = image::open(out_dir.join("scene_mask0.png")).unwrap().into_rgba8();
        let second = image::open(out_dir.join("scene_mask1.png")).unwrap().into_rgba8();
        assert_eq!(first.dimensions(), (16, 16));
        assert_eq!(first.get_pixel(2, 2)[3], 255);
        assert_eq!(first.get_pixel(10, 10)[3], 0);
        assert_eq!(second.get_pixel(10, 10)[3], 255);
    }

    #[test]
    fn render_reports_bad_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.json");
        std::fs::write(&input, r#"{ "width": 0, "height": 0 }"#).unwrap();
        let err = render_one(&input, None, None, None, false, &CanvasSettings::default()).unwrap_err();
        assert!(matches!(err, SceneError::Persist(PersistError::InvalidFormat(_))));
        assert!(!dir.path().join("broken.png").exists());
    }

    #[test]
    fn fingerprint_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scene.json");
        std::fs::write(&input, TWO_MASKS).unwrap();
        let settings = CanvasSettings::default();

        assert!(same_code(run_fingerprint(&[input.to_string_lossy().into_owned()], &settings), ExitCode::SUCCESS));

        let missing = dir.path().join("nope_*.json").to_string_lossy().into_owned();
        assert!(same_code(run_fingerprint(&[missing], &settings), ExitCode::FAILURE));
    }

    #[test]
    fn migrate_writes_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui_state.json");
        std::fs::write(&path, r#"{ "_version": 1, "activeTab": "queue" }"#).unwrap();
        run_migrate(&path, true).unwrap();
        let state = UiState::load(&path).unwrap();
        assert_eq!(state.version, 2);
        assert_eq!(state.active_tab, canvasfe::components::ui_state::TabName::Generation);
    }
}
