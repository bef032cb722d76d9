//! Console report and score distribution chart using Plotters

use std::path::Path;

use log::info;
use plotters::prelude::*;

use crate::model::RfvReport;

const BAR_COLOR: RGBColor = RGBColor(31, 119, 180);

/// Render the first `limit` customers as an aligned text table
pub fn format_head(report: &RfvReport, limit: usize) -> String {
    let id_width = report
        .customers
        .iter()
        .take(limit)
        .map(|c| c.customer_id.len())
        .max()
        .unwrap_or(0)
        .max("ID_cliente".len());

    let mut out = format!(
        "{:<id_width$} | {:>8} | {:>10} | {:>12} | R | F | V | Score | Ação\n",
        "ID_cliente", "Recencia", "Frequencia", "Valor"
    );
    out.push_str(&format!("{}\n", "-".repeat(id_width + 72)));

    for customer in report.customers.iter().take(limit) {
        out.push_str(&format!(
            "{:<id_width$} | {:>8} | {:>10} | {:>12.2} | {} | {} | {} | {:<5} | {}\n",
            customer.customer_id,
            customer.recency_days,
            customer.frequency,
            customer.value,
            customer.r_grade,
            customer.f_grade,
            customer.v_grade,
            customer.score.to_string(),
            customer.action.as_deref().unwrap_or("-"),
        ));
    }
    out
}

/// Customers per score, largest group first
pub fn format_summary(report: &RfvReport) -> String {
    let total = report.customers.len().max(1);
    let mut out = String::from("Score | Clientes |      %\n");
    for (score, count) in report.ranked_summary() {
        out.push_str(&format!(
            "{:<5} | {:>8} | {:>5.1}%\n",
            score.to_string(),
            count,
            count as f64 / total as f64 * 100.0
        ));
    }
    out
}

/// Print the segmentation the way the upload page shows it
pub fn print_report(report: &RfvReport, head: usize) {
    println!("=== Análise RFV - Recência, Frequência e Valor ===\n");
    println!("Data mais recente na base: {}", report.reference_date);
    println!("Clientes segmentados: {}\n", report.customers.len());

    println!("--- Segmentação RFV (primeiros {}) ---", head.min(report.customers.len()));
    print!("{}", format_head(report, head));

    println!("\n--- Quantidade de clientes por grupo ---");
    print!("{}", format_summary(report));
}

/// Bar chart of customers per score
pub fn create_score_chart(report: &RfvReport, output_path: &Path) -> crate::Result<()> {
    let bars = report.ranked_summary();
    if bars.is_empty() {
        anyhow::bail!("Report has no customers to chart");
    }

    let labels: Vec<String> = bars.iter().map(|(score, _)| score.to_string()).collect();
    let max_count = bars.iter().map(|(_, count)| *count).max().unwrap_or(1);

    let root = BitMapBackend::new(output_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Clientes por RFV Score", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((0..bars.len()).into_segmented(), 0..(max_count + max_count / 10 + 1))?;

    let label_of = |value: &SegmentValue<usize>| match value {
        SegmentValue::Exact(index) | SegmentValue::CenterOf(index) => {
            labels.get(*index).cloned().unwrap_or_default()
        }
        SegmentValue::Last => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len())
        .x_label_formatter(&label_of)
        .x_desc("RFV Score")
        .y_desc("Clientes")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(BAR_COLOR.filled())
            .margin(8)
            .data(bars.iter().enumerate().map(|(index, (_, count))| (index, *count))),
    )?;

    root.present()?;
    info!("Score chart saved to: {}", output_path.display());

    Ok(())
}
