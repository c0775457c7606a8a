use anyhow::{Context, bail};
use gravsim::{BackendKind, BodyStore, Coordinator, Integrator, presets};

/// Headless demo driver: run a preset for a number of steps on a
/// chosen backend and report the energy drift at the end.
///
/// Usage: gravsim [scenario] [steps] [euler|rk4] [inline|offload|gpu]
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let scenario = args.first().map(String::as_str).unwrap_or("figure-eight");
    let steps: u64 = args
        .get(1)
        .map(|s| s.parse())
        .transpose()
        .context("steps must be an integer")?
        .unwrap_or(1000);
    let integrator = match args.get(2).map(String::as_str) {
        None | Some("euler") => Integrator::Euler,
        Some("rk4") => Integrator::Rk4,
        Some(other) => bail!("unknown integrator {other:?}"),
    };

    let bodies =
        presets::by_name(scenario).with_context(|| format!("unknown scenario {scenario:?}"))?;
    let mut coordinator = Coordinator::new(BodyStore::from_bodies(bodies));
    coordinator.integrator = integrator;

    match args.get(3).map(String::as_str) {
        None | Some("inline") => {}
        Some("offload") => coordinator.enable_offload(),
        Some("gpu") => coordinator.enable_gpu(),
        Some(other) => bail!("unknown backend {other:?}"),
    }

    coordinator.sample_now();
    let mut dispatched: Option<BackendKind> = None;
    for _ in 0..steps {
        let Some(kind) = coordinator.step_blocking() else {
            bail!("step dropped; no bodies left?");
        };
        dispatched.get_or_insert(kind);
    }
    let sample = coordinator.sample_now();

    let backend = dispatched.map_or("none".to_owned(), |kind| format!("{kind:?}"));
    println!(
        "{scenario}: {} bodies after {steps} steps on {backend}, t = {:.3}",
        coordinator.store().len(),
        coordinator.time(),
    );
    println!(
        "energy: ke {:.6} pe {:.6} total {:.6} drift {}",
        sample.ke,
        sample.pe,
        sample.total,
        sample
            .drift_pct
            .map_or("n/a".to_owned(), |d| format!("{d:.6}%")),
    );
    Ok(())
}
