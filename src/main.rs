use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::debug;

use qsf::cli::{parse_entry, Cli, Commands, EncoderToken};
use qsf::filter::aead::{AeadEncoder, AeadFactory};
use qsf::filter::cid::CidEncoder;
use qsf::filter::zstr::ZstrEncoder;
use qsf::filter::EncoderFilter;
use qsf::keystore;
use qsf::manifest::ManifestRecord;
use qsf::reader::frames::FrameReader;
use qsf::reader::{Event, Reader, ReaderOpts};
use qsf::writer::Writer;

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("qsf: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Write { out, entries } => cmd_write(&out, &entries),
        Commands::Read {
            src,
            out,
            qrec,
            manifest,
            stream,
            key_dir,
        } => cmd_read(&src, out.as_deref(), qrec, manifest, stream, key_dir.as_deref()),
    }
}

fn cmd_write(out: &Path, entries: &[String]) -> Result<(), Box<dyn Error>> {
    let mut writer = Writer::new(File::create(out)?);

    for arg in entries {
        let spec = parse_entry(arg)?;

        let mut encoders: Vec<Box<dyn EncoderFilter>> = Vec::new();
        for token in spec.tokens {
            match token {
                EncoderToken::Cid => encoders.push(Box::new(CidEncoder::new())),
                EncoderToken::Zstr(codec) => encoders.push(Box::new(ZstrEncoder::new(codec))),
                EncoderToken::Encrypt(keyfile) => {
                    let (key, generated) = keystore::load_or_generate(&keyfile)?;
                    if generated {
                        eprintln!("qsf: generated key file {}", keyfile.display());
                    }
                    encoders.push(Box::new(AeadEncoder::new(&key)));
                }
            }
        }

        let mut source = File::open(&spec.path)?;
        let result = writer.write_entry(&mut source, &mut encoders, None)?;
        debug!(
            "{} -> stream {} ({} encoded bytes)",
            spec.path.display(),
            result.stream_id.value(),
            result.length
        );
    }

    writer.close()?;
    Ok(())
}

fn cmd_read(
    src: &Path,
    out: Option<&Path>,
    qrec: bool,
    manifest: bool,
    stream: bool,
    key_dir: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let file = File::open(src)?;

    if qrec {
        for frame in FrameReader::new(file) {
            let frame = frame?;
            println!(
                "{:?} stream={} length={}",
                frame.typ,
                frame.stream_id,
                frame.payload.len()
            );
        }
        return Ok(());
    }

    let mut opts = ReaderOpts::default();
    if let Some(dir) = key_dir {
        opts.decoders.push(Box::new(AeadFactory::with_keys(keystore::load_dir(dir)?)));
    }

    if let Some(dir) = out {
        fs::create_dir_all(dir)?;
    }

    let mut stdout = io::stdout().lock();
    for event in Reader::with_opts(file, opts) {
        match event? {
            Event::Begin(begin) => {
                if manifest {
                    let record = ManifestRecord::Config(begin.config().clone());
                    writeln!(stdout, "{}", serde_json::to_string(&record)?)?;
                    // dropping the begin drains the stream's data
                } else if stream {
                    io::copy(&mut begin.decode()?, &mut stdout)?;
                } else if let Some(dir) = out {
                    let path = dir.join(format!("stream-{}", begin.stream_id()));
                    io::copy(&mut begin.decode()?, &mut File::create(&path)?)?;
                    debug!("extracted {}", path.display());
                } else {
                    return Err("read needs --out, --qrec, --manifest or --stream".into());
                }
            }
            Event::End(end) => {
                if manifest {
                    let record = ManifestRecord::Result(end);
                    writeln!(stdout, "{}", serde_json::to_string(&record)?)?;
                }
            }
        }
    }
    Ok(())
}
