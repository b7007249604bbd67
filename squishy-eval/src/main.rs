use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use squishy::io::save_veg;
use squishy::scene::SceneConfig;
use squishy::{Error, Status};

const ABOUT: &str = "
Squishy is a quasi-static tetrahedral FEM solver for as-rigid-as-possible elastic solids.";

#[derive(Parser)]
#[clap(author, about = ABOUT, name = "squishy")]
struct Opt {
    /// Path to the scene configuration file in `ron` format.
    #[clap(name = "CONFIG", parse(from_os_str))]
    config: PathBuf,

    /// Output mesh file(s).
    ///
    /// Each frame is written to a `.veg` file named by incrementing the last numeric value in
    /// the path. For instance, an output value `./out_0001.veg` will be followed by
    /// `./out_0002.veg`, `./out_0003.veg` and so on.
    ///
    /// If no number occurs in the file name, one will be appended to the file stem. For instance,
    /// if `./out.veg` is specified, then the first frame will be written to `./out0.veg`, then
    /// `./out1.veg` and so on.
    #[clap(name = "OUTPUT", parse(from_os_str))]
    output: PathBuf,

    /// Log file path.
    #[clap(short, long, parse(from_os_str))]
    logfile: Option<PathBuf>,

    /// Number of steps of simulation to run.
    #[clap(short, long, default_value = "1")]
    steps: u64,

    /// Hide the progress bar.
    #[clap(short, long)]
    quiet: bool,
}

pub fn main() {
    if let Err(err) = try_main() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

/// Split a file stem into its prefix, the value of its trailing number and the number of digits.
fn split_frame_number(file_stem: &str) -> Result<(String, u64, usize)> {
    let prefix = file_stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &file_stem[prefix.len()..];
    let first_frame = if digits.is_empty() { 0 } else { digits.parse()? };
    Ok((prefix.to_string(), first_frame, digits.len()))
}

pub fn try_main() -> Result<()> {
    let _ = env_logger::Builder::from_env("SQUISHY_LOG").try_init();

    let opt = Opt::parse();

    let file_stem = if let Some(file_stem) = opt.output.file_stem() {
        file_stem.to_string_lossy().to_string()
    } else {
        anyhow::bail!(
            "Missing output file name in output path: {}",
            opt.output.display()
        )
    };
    match opt.output.extension().and_then(|x| x.to_str()) {
        Some("veg") => {}
        Some(ext) => anyhow::bail!("Unsupported output file extension: '.{}'", ext),
        None => anyhow::bail!(
            "Missing file extension in output path: {}",
            opt.output.display()
        ),
    }
    match opt.config.extension().and_then(|x| x.to_str()) {
        Some("ron") => {}
        Some(ext) => anyhow::bail!("Unsupported config extension: '.{}'", ext),
        None => anyhow::bail!(
            "Missing file extension in config path: {}",
            opt.config.display()
        ),
    }

    // Pre-emptively create the log file. This way we can fail early.
    if let Some(logfile) = opt.logfile.as_ref() {
        let _ = std::fs::File::create(logfile)?;
    }

    let scene_config = SceneConfig::load_from_ron(&opt.config)?;
    let mut solver = scene_config.build_solver()?;

    let (file_stem, first_frame, num_digits) = split_frame_number(&file_stem)?;
    let out_path = opt
        .output
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();

    // Write scene config so we know how the following log was created.
    let mut log = match opt.logfile.as_ref() {
        Some(logfile) => {
            let f = std::fs::File::options().append(true).open(logfile)?;
            let mut buf = std::io::BufWriter::new(f);
            writeln!(buf, "\nConfig:\n")?;
            scene_config.write_as_ron(&mut buf)?;
            writeln!(buf)?;
            Some(buf)
        }
        None => None,
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
    }
    {
        let interrupted = Arc::clone(&interrupted);
        solver.set_interrupter(move || interrupted.load(Ordering::SeqCst));
    }

    let progress = if opt.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(opt.steps)
    };
    progress.set_style(
        ProgressStyle::with_template("{elapsed_precise} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    for frame in 0..opt.steps {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        let result = match solver.step() {
            Ok(result) => result,
            Err(Error::LinearSolveNonConvergence { result })
                if result.status == Status::Interrupted =>
            {
                log::info!("Interrupted at frame {}", frame);
                break;
            }
            Err(err) => {
                progress.abandon();
                return Err(err.into());
            }
        };

        if let Some(buf) = log.as_mut() {
            writeln!(buf, "\nFrame {}:\n{}", frame, result)?;
        }

        let mut out_file_name = file_stem.clone();
        out_file_name.push_str(&format!("{:01$}", first_frame + frame, num_digits));
        save_veg(
            solver.mesh(),
            solver.vertex_positions(),
            out_path.join(out_file_name).with_extension("veg"),
        )?;

        progress.set_message(format!("load {:.3e}", result.load));
        progress.inc(1);
    }

    progress.finish();
    if let Some(mut buf) = log {
        buf.flush()?;
    }
    Ok(())
}
