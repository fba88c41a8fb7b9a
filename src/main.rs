//! tfxplay CLI — module info, time tables and WAV export.
//!
//! Usage:
//!   tfx-cli song.tfx
//!   tfx-cli mdat.song smpl.song --subsong 1 --wav out.wav

use std::{env, fs, process};

use tfx_master::Controller;

struct Args {
    mdat: String,
    smpl: Option<String>,
    subsong: u16,
    wav: Option<String>,
    seconds: u32,
    rate: u32,
    table: bool,
}

fn main() {
    env_logger::init();
    let args = parse_args().unwrap_or_else(|msg| {
        eprintln!("{msg}");
        eprintln!(
            "Usage: tfx-cli <mdat-or-tfhd-file> [smpl-file] \
             [--subsong N] [--wav out.wav] [--seconds N] [--rate N] [--table]"
        );
        process::exit(1);
    });

    let data = fs::read(&args.mdat).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", args.mdat, e);
        process::exit(1);
    });
    let samples = args.smpl.as_ref().map(|path| {
        fs::read(path).unwrap_or_else(|e| {
            eprintln!("Failed to read {path}: {e}");
            process::exit(1);
        })
    });

    let mut ctrl = Controller::new();
    ctrl.load(&data, samples.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to parse module: {e}");
        process::exit(1);
    });

    let module = ctrl.module().expect("module was just loaded");
    for line in module.comment.iter().filter(|l| !l.is_empty()) {
        println!("  {line}");
    }
    println!("Subsongs: {}", ctrl.subsong_count());
    println!("Samples:  {} bytes", module.samples.len());
    if let Some(duration) = ctrl.duration(args.subsong, args.rate) {
        println!("Length:   {:.1}s (subsong {})", duration.as_secs_f64(), args.subsong);
    }
    if let Some(chans) = ctrl.channel_count(args.subsong, args.rate) {
        println!("Channels: {chans}");
    }

    if args.table {
        print_time_table(&ctrl, args.subsong, args.rate);
    }

    if let Some(path) = &args.wav {
        render_to_wav(&ctrl, &args, path);
    }
}

fn print_time_table(ctrl: &Controller, subsong: u16, rate: u32) {
    let Some(table) = ctrl.time_table(subsong, rate) else {
        return;
    };
    println!();
    for entry in table {
        println!("  pos {:3}  {:8.2}s", entry.pos.0, entry.time.as_secs_f64());
    }
}

fn render_to_wav(ctrl: &Controller, args: &Args, path: &str) {
    println!("Rendering to {} at {} Hz...", path, args.rate);
    let wav = ctrl.render_to_wav(args.subsong, args.rate, args.seconds);
    println!("Rendered {} bytes", wav.len());
    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {path}: {e}");
        process::exit(1);
    });
    println!("Done.");
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        mdat: String::new(),
        smpl: None,
        subsong: 0,
        wav: None,
        seconds: 600,
        rate: 44100,
        table: false,
    };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--subsong" => args.subsong = next_value(&mut it, "--subsong")?,
            "--seconds" => args.seconds = next_value(&mut it, "--seconds")?,
            "--rate" => args.rate = next_value(&mut it, "--rate")?,
            "--wav" => {
                args.wav = Some(it.next().ok_or("--wav needs a path")?);
            }
            "--table" => args.table = true,
            other if other.starts_with("--") => {
                return Err(format!("Unknown option {other}"));
            }
            other => {
                if args.mdat.is_empty() {
                    args.mdat = other.to_string();
                } else if args.smpl.is_none() {
                    args.smpl = Some(other.to_string());
                } else {
                    return Err(format!("Unexpected argument {other}"));
                }
            }
        }
    }
    if args.mdat.is_empty() {
        return Err("No input file".to_string());
    }
    if args.rate == 0 || args.rate > 192_000 {
        return Err("Sample rate out of range".to_string());
    }
    Ok(args)
}

fn next_value<T: std::str::FromStr>(
    it: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T, String> {
    it.next()
        .ok_or_else(|| format!("{flag} needs a value"))?
        .parse()
        .map_err(|_| format!("{flag} needs a number"))
}
