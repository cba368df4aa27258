//! `spikey`: command-line interface for the Spikey link protocol.
//!
//! ```text
//! USAGE:
//!   spikey decode <word>...          Decode raw 64-bit link words
//!   spikey layout                    Print the packet and register field layout
//!   spikey events <t:n[:bin]>...     Pack events into link words
//!   spikey plut [--slope] [--offset] Print a linear plasticity LUT
//!   spikey plan <addr=value>...      Assign timing LUT indices to parameters
//!   spikey selftest [--chip]         Exercise every protocol path on a software chip
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spikey_chip::{control, event, packet, pram, synapse, Field};
use spikey_driver::{
    classify, linear_plut, pack_event_stream, plan_timing, program_delays, sort_triangle,
    unpack_events, ChipConfig, CommandPacket, ControlPort, Event, EventPacket, Frame, ParamEntry,
    SpikeyDevice, SynapseTiming, VirtualChip, Word, DEFAULT_LUT, SYSTEM_CLOCK_HZ,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spikey", about = "Spikey link protocol tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Decode raw link words (hex, `0x` prefix optional).
    Decode {
        /// Words to decode.
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Print the bit layout of packets and registers.
    Layout,
    /// Pack events given as `time:neuron[:bin]` into link words.
    Events {
        /// Destination chip id.
        #[arg(long, default_value_t = 0)]
        chip: u8,
        /// Events in time order.
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// Print a linear plasticity lookup table.
    Plut {
        /// Weight change per correlation step.
        #[arg(long, default_value_t = 1.0)]
        slope: f32,
        /// Weight at zero correlation.
        #[arg(long, default_value_t = 0.0)]
        offset: f32,
    },
    /// Order parameters as a value ramp and assign timing LUT indices.
    Plan {
        /// Parameters as `paraddr=value`.
        #[arg(required = true)]
        params: Vec<String>,
    },
    /// Run init, upload, synapse and delay sequences against a software chip.
    Selftest {
        /// Chip id of the software chip.
        #[arg(long, default_value_t = 0)]
        chip: u8,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Decode { words } => cmd_decode(&words)?,
        Cmd::Layout => cmd_layout(),
        Cmd::Events { chip, events } => cmd_events(chip, &events)?,
        Cmd::Plut { slope, offset } => cmd_plut(slope, offset),
        Cmd::Plan { params } => cmd_plan(&params)?,
        Cmd::Selftest { chip } => cmd_selftest(chip)?,
    }

    Ok(())
}

fn parse_hex(s: &str) -> Result<u64> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X").replace('_', "");
    u64::from_str_radix(&digits, 16).with_context(|| format!("'{s}' is not a hex word"))
}

fn cmd_decode(words: &[String]) -> Result<()> {
    for raw in words {
        let word = Word::new(parse_hex(raw)?);
        let header = classify(word);
        println!("{word}  chip {}", header.chip_id);
        match Frame::from_word(word) {
            Frame::Empty => println!("  empty packet"),
            Frame::Event(w) => {
                let packet = EventPacket::from_word(w)?;
                println!("  event packet, {} valid slot(s)", packet.len());
                for e in unpack_events(packet) {
                    println!(
                        "    t={:3} (mod 256)  neuron {:3}  bin {:2}",
                        e.time, e.neuron, e.time_bin
                    );
                }
            }
            Frame::Command(c) => print_command(&c),
        }
    }
    Ok(())
}

fn print_command(c: &CommandPacket) {
    println!(
        "  {:?} {}{}  ci {:#x}",
        c.access,
        c.command,
        if c.error { " [error]" } else { "" },
        c.data
    );
    match c.command {
        spikey_driver::Command::ParamRam => {
            let (slot, entry) = spikey_driver::decode_param(c.data);
            println!(
                "    sub {}  slot {slot}  paraddr {}  value {}  lut {}",
                pram::SUB_COMMAND.get(c.data),
                entry.paraddr,
                entry.value,
                entry.lut
            );
        }
        spikey_driver::Command::SynapseRam => {
            println!(
                "    sub {}  row {}  col {}  data {:#08x}",
                synapse::SUB_COMMAND.get(c.data),
                synapse::ROW.get(c.data),
                synapse::COLUMN.get(c.data),
                synapse::DATA.get(c.data)
            );
        }
        spikey_driver::Command::Control => {
            println!(
                "    register {:#010x}  selector {}",
                control::REGISTER.get(c.data),
                control::SELECTOR.get(c.data)
            );
        }
        _ => {}
    }
}

fn print_fields(title: &str, fields: &[Field]) {
    println!("{title}");
    for f in fields {
        println!("  {:<12} [{:2}..{:2}]  {:2} bit(s)", f.name, f.pos, f.end(), f.width);
    }
    println!();
}

fn cmd_layout() {
    print_fields("Frame (64-bit word)", &packet::FRAME_FIELDS);
    print_fields("Command packet", &packet::command::FIELDS);

    let mut slots = vec![event::TIME_MSB];
    for s in &event::SLOTS {
        slots.extend([s.valid, s.time_bin, s.time_lsb, s.neuron]);
    }
    print_fields("Event packet", &slots);

    print_fields("Control register (ci)", &[control::REGISTER, control::SELECTOR]);
    print_fields(
        "Parameter RAM write (ci)",
        &[
            pram::SUB_COMMAND,
            pram::ram::SLOT,
            pram::ram::PARADDR,
            pram::ram::VALUE,
            pram::ram::LUT,
        ],
    );
    print_fields(
        "Synapse control (ci)",
        &[
            synapse::SUB_COMMAND,
            synapse::COLUMN,
            synapse::ROW,
            synapse::DATA,
            synapse::PCOR_START_ROW,
            synapse::PCOR_STOP_ROW,
        ],
    );
    println!("Parameter RAM banks");
    for bank in pram::Bank::ALL {
        println!("  {:<14} {:4}..{:4}", bank.name(), bank.start(), bank.end());
    }
}

fn parse_event(s: &str) -> Result<Event> {
    let parts: Vec<&str> = s.split(':').collect();
    let (time, neuron, bin) = match parts.as_slice() {
        [t, n] => (*t, *n, "0"),
        [t, n, b] => (*t, *n, *b),
        _ => bail!("'{s}' is not time:neuron[:bin]"),
    };
    Ok(Event::new(
        time.parse::<u64>().with_context(|| format!("bad time in '{s}'"))?,
        neuron.parse::<u16>().with_context(|| format!("bad neuron in '{s}'"))?,
        bin.parse::<u8>().with_context(|| format!("bad time bin in '{s}'"))?,
    ))
}

fn cmd_events(chip: u8, events: &[String]) -> Result<()> {
    let events = events
        .iter()
        .map(|s| parse_event(s))
        .collect::<Result<Vec<_>>>()?;
    let packets = pack_event_stream(events)?;
    println!("{} packet(s) for chip {chip}", packets.len());
    for p in packets {
        println!("  {}  ({} event(s))", p.to_word(chip)?, p.len());
    }
    Ok(())
}

fn cmd_plut(slope: f32, offset: f32) {
    let table = linear_plut(slope, offset);
    println!("Linear plasticity LUT (slope {slope}, offset {offset})");
    for (i, w) in table.iter().enumerate() {
        let kind = if i < table.len() / 2 { "acausal" } else { "causal" };
        println!("  {i:2}  {kind:<7}  weight {:2}  word {w:#08x}", w & 0xF);
    }
}

fn cmd_plan(params: &[String]) -> Result<()> {
    let mut entries = params
        .iter()
        .map(|s| -> Result<ParamEntry> {
            let (addr, value) = s
                .split_once('=')
                .with_context(|| format!("'{s}' is not paraddr=value"))?;
            Ok(ParamEntry::new(addr.trim().parse::<u32>()?, value.trim().parse::<u32>()?, 0))
        })
        .collect::<Result<Vec<_>>>()?;
    sort_triangle(&mut entries);
    let cycles = plan_timing(&mut entries, &DEFAULT_LUT)?;

    println!("{:>5}  {:>8}  {:>5}  {:>3}", "slot", "paraddr", "value", "lut");
    for (slot, e) in entries.iter().enumerate() {
        println!("{slot:5}  {:8}  {:5}  {:3}", e.paraddr, e.value, e.lut);
    }
    #[allow(clippy::cast_precision_loss)]
    let ms = cycles as f64 * 1000.0 / SYSTEM_CLOCK_HZ as f64;
    println!("refresh: {cycles} cycles ({ms:.3} ms)");
    Ok(())
}

fn cmd_selftest(chip: u8) -> Result<()> {
    let config = ChipConfig::for_chip(chip)?;
    let mut dev = SpikeyDevice::open(VirtualChip::new(chip), &config)?;

    let revision = dev.init()?;
    println!("init          ok  (revision {revision})");

    let (register, _) = dev.control().read()?;
    println!("control       ok  ({register})");

    let entries: Vec<ParamEntry> = (0..64u32)
        .map(|i| ParamEntry::new(pram::Bank::VoutLeft.start() + i, (i * 97) % 1024, 0))
        .collect();
    let parts = dev.parts();
    let (_, summary) = parts.pram.upload_planned(parts.link, &entries, &DEFAULT_LUT)?;
    println!(
        "param ram     ok  ({} entries verified, {} cycles per refresh)",
        summary.verified, summary.refresh_cycles
    );

    parts.synapse.write_plut_table(parts.link, &linear_plut(1.0, 0.0))?;
    for col in 0..64 {
        parts.synapse.write_synapse(parts.link, 0, col, u32::from(col))?;
    }
    let back = parts.synapse.read_synapse(parts.link, 0, 63)?;
    parts.synapse.close(parts.link)?;
    if back != 63 {
        bail!("synapse read-back {back} != 63");
    }
    parts.synapse.write_time(
        parts.link,
        SynapseTiming {
            sense: 10,
            precharge: 10,
            pcor_period: 100,
            read_wait: false,
        },
    )?;
    parts.synapse.process_correlation(parts.link, 0, 255, true)?;
    parts.synapse.wait_done(parts.link, 16)?;
    println!("synapse       ok");

    let mut chip_model = dev.into_inner();
    let delays: Vec<(u32, u32)> = (0..36).map(|l| (l, l % 8)).collect();
    program_delays(&mut chip_model, chip, &delays)?;
    println!("delay lines   ok  ({} lines)", delays.len());

    let mut link = spikey_driver::ChipLink::with_config(chip_model, &config)?;
    let (register, _) = ControlPort::new(&mut link).read()?;
    info!("final control register {register}");
    println!("✅ selftest passed on chip {chip}");
    Ok(())
}
