use crate::domain::{QualityScore, Target, TimeSample};

/// Render copied-out history windows as CSV. One row per sample; the
/// quality column repeats the target's current score.
pub fn render_snapshot(sections: &[(Target, Vec<TimeSample>, Option<QualityScore>)]) -> String {
    let mut out = String::from("target,timestamp,rtt_ms,offset_ms,valid,quality\n");
    for (target, samples, quality) in sections {
        let score = quality
            .map(|q| format!("{:.1}", q.score))
            .unwrap_or_default();
        for sample in samples {
            let rtt = sample
                .rtt_ms()
                .map(|v| format!("{:.3}", v))
                .unwrap_or_default();
            let offset = sample
                .offset_ms()
                .map(|v| format!("{:.3}", v))
                .unwrap_or_default();
            out.push_str(&format!(
                "{},{},{},{},{},{}\n",
                escape(&target.name),
                sample.at.to_rfc3339(),
                rtt,
                offset,
                sample.valid,
                score
            ));
        }
    }
    out
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
