use std::fmt::Write;

use barabara_core::Phase;

use crate::app_core::SessionSnapshot;
use crate::runtime::PuzzleView;

pub(crate) fn fmt_f32(value: f32) -> String {
    format!("{:.3}", value)
}

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle",
        Phase::Scattered => "scattered",
        Phase::Moving => "moving",
        Phase::Complete => "complete",
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// One `<image>` per piece at its published position, in display order.
pub fn render_svg(snapshot: &SessionSnapshot) -> String {
    let frame = &snapshot.frame;
    let width = fmt_f32(snapshot.viewport.width);
    let height = fmt_f32(snapshot.viewport.height);
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}" width="{width}" height="{height}" data-phase="{}" data-generation="{}""#,
        phase_name(frame.phase),
        frame.generation,
    );
    if let Some(result) = snapshot.result_ref.as_deref() {
        let _ = write!(out, r#" data-result="{}""#, escape_attr(result));
    }
    out.push_str(">\n");

    let piece_w = fmt_f32(frame.piece_size.width);
    let piece_h = fmt_f32(frame.piece_size.height);
    for &index in &snapshot.order {
        let Some(pos) = frame.positions.get(index) else {
            continue;
        };
        let Some(url) = snapshot.piece_url(index) else {
            continue;
        };
        let _ = writeln!(
            out,
            r#"  <image href="{}" x="{}" y="{}" width="{piece_w}" height="{piece_h}" data-piece="{index}"/>"#,
            escape_attr(&url),
            fmt_f32(pos.x),
            fmt_f32(pos.y),
        );
    }
    out.push_str("</svg>\n");
    out
}

/// Keeps the markup of the latest render.
#[derive(Default)]
pub struct SvgView {
    last: Option<String>,
    renders: u64,
}

impl SvgView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn renders(&self) -> u64 {
        self.renders
    }

    pub fn take(&mut self) -> Option<String> {
        self.last.take()
    }
}

impl PuzzleView for SvgView {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        self.last = Some(render_svg(snapshot));
        self.renders += 1;
    }
}
