//! Terminal formatting for the metrics summary.

use colored::Colorize;
use trendlab_core::Metrics;

/// Color a value based on whether it's positive or negative.
pub fn color_value(value: f64, format_str: String, invert: bool) -> String {
    let is_positive = if invert { value < 0.0 } else { value > 0.0 };
    if is_positive {
        format_str.green().to_string()
    } else if value == 0.0 {
        format_str.yellow().to_string()
    } else {
        format_str.red().to_string()
    }
}

/// Format the metrics report with colors for terminal display.
pub fn format_metrics_colored(metrics: &Metrics) -> String {
    if let Some(warning) = &metrics.warning {
        return format!("{} {}\n", "warning:".yellow(), warning);
    }

    let mut out = String::new();

    let total_return_pct = metrics.total_return.to_string().parse::<f64>().unwrap_or(0.0) * 100.0;
    out.push_str(&format!(
        "{:<24} {}\n",
        "Total Return:".cyan(),
        color_value(total_return_pct, format!("{:.2}%", total_return_pct), false)
    ));
    out.push_str(&format!("{:<24} {}\n", "CAGR:".cyan(), color_value(metrics.cagr, format!("{:.2}%", metrics.cagr * 100.0), false)));
    out.push_str(&format!("{:<24} {:.3}\n", "Sharpe:".cyan(), metrics.sharpe));
    out.push_str(&format!("{:<24} {:.3}\n", "Sortino:".cyan(), metrics.sortino));
    out.push_str(&format!("{:<24} {:.3}\n", "Calmar:".cyan(), metrics.calmar));
    out.push_str(&format!(
        "{:<24} {}\n",
        "Max Drawdown:".cyan(),
        color_value(metrics.max_drawdown_pct, format!("{:.2}%", metrics.max_drawdown_pct * 100.0), true)
    ));
    out.push_str(&format!("{:<24} {}\n", "Drawdown Duration:".cyan(), format!("{} days", metrics.drawdown_duration_days)));
    out.push_str(&format!("{:<24} {:.2}%\n", "Win Rate:".cyan(), metrics.win_rate * 100.0));
    out.push_str(&format!("{:<24} {:.2}\n", "Profit Factor:".cyan(), metrics.profit_factor));
    out.push_str(&format!("{:<24} {}\n", "Total Trades:".cyan(), metrics.total_trades));
    out.push_str(&format!("{:<24} {:.1}\n", "Avg Holding (days):".cyan(), metrics.avg_holding_period_days));
    out.push_str(&format!("{:<24} {:.3}\n", "Omega Ratio:".cyan(), metrics.omega_ratio));
    out.push_str(&format!("{:<24} {:.2}%\n", "VaR 95%:".cyan(), metrics.var_95 * 100.0));
    out.push_str(&format!("{:<24} {:.2}%\n", "CVaR 95%:".cyan(), metrics.cvar_95 * 100.0));
    out.push_str(&format!("{:<24} {:.3}\n", "Ulcer Index:".cyan(), metrics.ulcer_index));

    out
}

/// Render a sparkline for an equity curve.
pub fn sparkline(values: &[f64]) -> String {
    if values.is_empty() {
        return String::new();
    }

    let blocks = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range == 0.0 {
        return blocks[3].to_string().repeat(values.len().min(40));
    }

    let step = if values.len() > 40 { values.len() / 40 } else { 1 };

    values
        .iter()
        .step_by(step)
        .take(40)
        .map(|v| {
            let normalized = ((v - min) / range * 7.0) as usize;
            blocks[normalized.min(7)]
        })
        .collect()
}

/// Print a horizontal separator.
pub fn print_separator() {
    println!("{}", "-".repeat(70).dimmed());
}

/// Print a section header.
pub fn print_section(title: &str) {
    println!("\n{}", title.cyan().bold());
    print_separator();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparkline_empty() {
        assert_eq!(sparkline(&[]), "");
    }

    #[test]
    fn sparkline_increasing() {
        let result = sparkline(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert!(result.starts_with('▁'));
        assert!(result.ends_with('█'));
    }

    #[test]
    fn color_value_positive_is_colored() {
        let result = color_value(1.5, "1.5".to_string(), false);
        assert!(result.contains("1.5"));
    }

    #[test]
    fn format_metrics_reports_warning_on_empty_input() {
        let metrics = trendlab_core::metrics::compute_metrics(
            &trendlab_core::BacktestResult {
                journal: vec![],
                equity_history: vec![],
                final_value: Default::default(),
                metadata: trendlab_core::RunMetadata {
                    strategy_name: "x".to_string(),
                    parameters: serde_json::Value::Null,
                    initial_capital: Default::default(),
                    logical_start: None,
                    start_timestamp: None,
                    end_timestamp: None,
                    cancelled: false,
                },
            },
            Default::default(),
            trendlab_core::metrics::Timeframe::Daily,
            0.02,
        );
        assert!(format_metrics_colored(&metrics).contains("warning"));
    }
}
