use anyhow::Context;
use colored::Colorize;

use tally_sdk::{EventFilter, EventKind, TallyConfig};

use crate::cli::*;
use crate::scenario::{Outcome, Scenario, Simulation, SimulationReport};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Simulate(args) => cmd_simulate(args, cli.format),
        Command::Events(args) => cmd_events(args, cli.format),
        Command::Config(args) => cmd_config(args),
    }
}

fn amounts(list: &[tally_sdk::AssetAmount]) -> String {
    list.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}

fn cmd_simulate(args: SimulateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let mut report = Simulation::run(&scenario)?.report()?;
    if let Some(holder) = &args.holder {
        for d in &mut report.distributions {
            d.claims.retain(|c| &c.holder == holder);
        }
    }
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!("{} {} at t{}", "Release".bold(), report.release.yellow(), report.now);
    for outcome in &report.outcomes {
        match outcome {
            Outcome::Advanced { now } => println!("  {} clock -> t{now}", "·".dimmed()),
            Outcome::Moved { from, to, amount } => println!("  {} {from} -> {to}: {amount}", "↔".cyan()),
            Outcome::Distributed { distribution, holders } => {
                println!("  {} distribution #{distribution} active ({holders} claims)", "✓".green())
            }
            Outcome::Claimed {
                holder,
                distribution,
                amounts: paid,
            } => println!("  {} {holder} claimed {} from #{distribution}", "$".green(), amounts(paid)),
            Outcome::Cancelled { distribution, refund } => {
                println!("  {} distribution #{distribution} cancelled, refunded {}", "✗".red(), amounts(refund))
            }
        }
    }

    for d in &report.distributions {
        println!();
        println!(
            "{} #{} {} [{}]",
            "Distribution".bold(),
            d.index,
            d.id.dimmed(),
            d.phase.cyan()
        );
        println!("  total shares: {}", d.total_shares);
        println!("  payout:       {}", amounts(&d.royalties_to_payout));
        println!("  calculated:   {}", amounts(&d.calculated_royalties_to_payout));
        println!("  distributed:  {}", amounts(&d.amounts_distributed));
        for c in &d.claims {
            let status = if c.claimed { "claimed".green() } else { "open".yellow() };
            println!("    {:<20} {:>12} shares  {}  {}", c.holder, c.user_shares, amounts(&c.amounts), status);
        }
    }
}

fn cmd_events(args: EventsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let sim = Simulation::run(&scenario)?;
    sim.tally.verify_journal().context("journal integrity check failed")?;

    let kinds = match &args.kind {
        Some(name) => Some(vec![parse_kind(name)?]),
        None => None,
    };
    let events = sim.tally.journal().query(&EventFilter {
        kinds,
        ..Default::default()
    })?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
        OutputFormat::Text => {
            for e in &events {
                println!(
                    "{:>4} {:<8} {:<28} {} {}",
                    e.seq,
                    e.at.to_string().dimmed(),
                    e.kind.to_string().cyan(),
                    e.subject,
                    e.id.short_hex().dimmed()
                );
            }
            println!("{} {} events, integrity verified", "✓".green().bold(), events.len());
        }
    }
    Ok(())
}

fn parse_kind(name: &str) -> anyhow::Result<EventKind> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .with_context(|| format!("unknown event kind `{name}`"))
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = match &args.path {
        Some(path) => TallyConfig::load(path)?,
        None => TallyConfig::default(),
    };
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_parse_by_variant_name() {
        assert_eq!(parse_kind("Claimed").unwrap(), EventKind::Claimed);
        assert_eq!(parse_kind("DistributionPrimed").unwrap(), EventKind::DistributionPrimed);
        assert!(parse_kind("claimed").is_err());
    }

    #[test]
    fn config_file_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        std::fs::write(&path, "[batch]\nclaim_batch_size = 0\n").unwrap();
        assert!(cmd_config(ConfigArgs { path: Some(path) }).is_err());
    }

    #[test]
    fn simulate_reads_scenario_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(
            &path,
            "release = \"r\"\n[[holders]]\naccount = \"a\"\nshares = 5\n[[steps]]\nop = \"advance\"\nsecs = 1200\n",
        )
        .unwrap();
        let args = SimulateArgs {
            scenario: path.clone(),
            holder: None,
        };
        cmd_simulate(args, OutputFormat::Json).unwrap();
        cmd_events(EventsArgs { scenario: path, kind: Some("SharesAssigned".into()) }, OutputFormat::Text).unwrap();
    }
}
