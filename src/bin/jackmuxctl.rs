use std::env;
use std::error::Error;
use std::process;
use std::thread;
use std::time::Duration;

use jackmux::backend::Backend;
use jackmux::control::api::{self, SharedSession};
use jackmux::control::feeder::ToneFeeder;
use jackmux::sim::SimBackend;
use jackmux::{Session, SessionConfig, SessionStatus};

const USAGE: &str = "Usage: jackmuxctl [OPTIONS]

  --simulate              Run against the in-process engine instead of JACK
  --client NAME           Client name (default: jackmux)
  --group NAME:IN:OUT     Register a group; repeatable (default: main:2:2)
  --midi NAME             Register a MIDI input channel; repeatable
  --connect SRC=DST       Connect two ports after registration; repeatable
  --tone HZ               Feed every group with a sine tone at HZ
  --status                Print a status snapshot and exit
  --help                  Show this message

Without --status the interactive console launches.";

struct Options {
    simulate: bool,
    client: String,
    groups: Vec<(String, usize, usize)>,
    midi: Vec<String>,
    connections: Vec<(String, String)>,
    tone_hz: Option<f64>,
    status: bool,
}

fn parse_args() -> Result<Option<Options>, String> {
    let mut options = Options {
        simulate: false,
        client: SessionConfig::default().client_name,
        groups: Vec::new(),
        midi: Vec::new(),
        connections: Vec::new(),
        tone_hz: None,
        status: false,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--simulate" => options.simulate = true,
            "--status" | "-s" => options.status = true,
            "--help" | "-h" => return Ok(None),
            "--client" => options.client = value("--client")?,
            "--group" => options.groups.push(parse_group(&value("--group")?)?),
            "--midi" => options.midi.push(value("--midi")?),
            "--connect" => {
                let spec = value("--connect")?;
                let (src, dst) = spec
                    .split_once('=')
                    .ok_or_else(|| format!("expected SRC=DST, got '{spec}'"))?;
                options.connections.push((src.to_string(), dst.to_string()));
            }
            "--tone" => {
                let raw = value("--tone")?;
                let hz = raw
                    .parse::<f64>()
                    .map_err(|_| format!("invalid frequency '{raw}'"))?;
                options.tone_hz = Some(hz);
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    if options.groups.is_empty() {
        options.groups.push(("main".to_string(), 2, 2));
    }
    Ok(Some(options))
}

fn parse_group(spec: &str) -> Result<(String, usize, usize), String> {
    let mut parts = spec.rsplitn(3, ':');
    let outputs = parts.next();
    let inputs = parts.next();
    let name = parts.next();
    match (name, inputs, outputs) {
        (Some(name), Some(inputs), Some(outputs)) if !name.is_empty() => {
            let inputs = inputs
                .parse()
                .map_err(|_| format!("invalid input count in '{spec}'"))?;
            let outputs = outputs
                .parse()
                .map_err(|_| format!("invalid output count in '{spec}'"))?;
            Ok((name.to_string(), inputs, outputs))
        }
        _ => Err(format!("expected NAME:IN:OUT, got '{spec}'")),
    }
}

fn print_status(status: &SessionStatus) {
    println!("Sample Rate : {} Hz", status.sample_rate);
    println!("Buffer Size : {} frames", status.buffer_size);
    println!("Block       : {:.2} ms", status.latency_ms);
    println!("Active      : {}", if status.active { "yes" } else { "no" });
    println!("Groups:");
    for group in &status.groups {
        let c = &group.counters;
        println!(
            "  [{}] {} | in={} out={} | fill={:.1}% | blocks={} | signals={} (+{} coalesced) | underruns={} | overruns={} | dropped={} | silent={}",
            group.id,
            group.name,
            group.inputs,
            group.outputs,
            group.output_fill() * 100.0,
            c.blocks,
            c.need_data_signals,
            c.coalesced_signals,
            c.underruns,
            c.overruns,
            c.dropped_writes,
            c.silent_reads,
        );
        for port in &group.ports {
            println!(
                "      {} ({}) {} bytes, {:.1}%",
                port.name,
                port.direction,
                port.buffered_bytes,
                port.fill * 100.0
            );
        }
    }
    if !status.midi.is_empty() {
        println!("MIDI:");
        for channel in &status.midi {
            println!(
                "  {} | events={} | bytes={} | dropped={}",
                channel.port_name,
                channel.counters.events,
                channel.counters.bytes,
                channel.counters.dropped,
            );
        }
    }
}

fn run<B>(session: Session<B>, options: &Options) -> Result<(), Box<dyn Error>>
where
    B: Backend + Send + 'static,
{
    let session: SharedSession<B> = api::share(session);
    let mut feeder = ToneFeeder::new(options.tone_hz.unwrap_or(440.0), 0.25);

    for (name, inputs, outputs) in &options.groups {
        let (receiver, id) = session.lock().add_group(name, *inputs, *outputs)?;
        feeder.attach(&session, id, receiver, options.tone_hz.is_some())?;
    }

    for name in &options.midi {
        let mut receiver = session.lock().add_midi(name)?;
        let channel = name.clone();
        thread::Builder::new()
            .name(format!("jackmux-midi-{channel}"))
            .spawn(move || {
                let mut buf = [0u8; 256];
                while let Ok(n) = receiver.recv(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    tracing::debug!(channel = %channel, bytes = ?&buf[..n], "midi");
                }
            })?;
    }

    for (src, dst) in &options.connections {
        session.lock().connect(src, dst)?;
    }

    if options.status {
        thread::sleep(Duration::from_millis(250));
        print_status(&api::get_status(&session));
        return Ok(());
    }

    jackmux::control::ui::run(&session, Some(&feeder))
}

fn main() {
    let options = match parse_args() {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{USAGE}");
            return;
        }
        Err(err) => {
            eprintln!("jackmuxctl: {err}");
            process::exit(1);
        }
    };

    if options.status {
        jackmux::init_tracing();
    }

    let config = SessionConfig::new(options.client.clone());
    let result = if options.simulate {
        let backend = SimBackend::default();
        let _clock = backend.engine().spawn_clock();
        Session::open(backend, config)
            .map_err(Box::<dyn Error>::from)
            .and_then(|session| run(session, &options))
    } else {
        jackmux::open_session(config)
            .map_err(Box::<dyn Error>::from)
            .and_then(|session| run(session, &options))
    };

    if let Err(err) = result {
        eprintln!("jackmuxctl: {err}");
        process::exit(1);
    }
}
