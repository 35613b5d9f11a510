//! Signal usability decision and effective weight resolution.

use urbanicity_models::{DensityRow, SignalDecision, SignalMode, Weights};

/// Fraction of cells with a positive signal density (`0.0` when there are
/// no cells).
#[must_use]
pub fn signal_coverage(densities: &[DensityRow]) -> f64 {
    if densities.is_empty() {
        return 0.0;
    }
    let with_signal = densities.iter().filter(|d| d.signal > 0.0).count();
    #[allow(clippy::cast_precision_loss)]
    let fraction = with_signal as f64 / densities.len() as f64;
    fraction
}

/// Whether the signal metric is usable under `mode`.
#[must_use]
pub fn is_signal_usable(mode: SignalMode, coverage: f64, sparsity_threshold: f64) -> bool {
    match mode {
        SignalMode::On => true,
        SignalMode::Off => false,
        SignalMode::Auto => coverage >= sparsity_threshold,
    }
}

/// Decides signal usability and resolves the weights actually applied.
///
/// Usable: base weights unchanged. Not usable: signal weight `0.0`,
/// intersection and road rescaled to sum to `1.0`.
#[must_use]
pub fn resolve_signal(
    slug: &str,
    densities: &[DensityRow],
    mode: SignalMode,
    sparsity_threshold: f64,
    base: &Weights,
) -> SignalDecision {
    let coverage = signal_coverage(densities);
    let used = is_signal_usable(mode, coverage, sparsity_threshold);

    match mode {
        SignalMode::On => log::info!("[{slug}] signal_mode=on: signals always included."),
        SignalMode::Off => log::info!("[{slug}] signal_mode=off: signals always dropped."),
        SignalMode::Auto => log::info!(
            "[{slug}] signal_mode=auto: {:.1}% of cells have a signal -> {}.",
            coverage * 100.0,
            if used { "INCLUDED" } else { "DROPPED (too sparse)" }
        ),
    }

    let weights = if used { *base } else { base.without_signal() };

    log::info!(
        "[{slug}] Score weights: int={:.3} road={:.3} sig={:.3}",
        weights.intersection,
        weights.road,
        weights.signal
    );

    SignalDecision {
        used,
        coverage,
        weights,
    }
}
