use crate::model::{Alignment, Margins, Page, Paragraph, Run};
use crate::pdf::{PageText, TextSpan};

const DEFAULT_MARGIN: f32 = 72.0;
/// Ascender and descender as a share of the font size, for margin estimates.
const ASCENT: f32 = 0.8;
const DESCENT: f32 = 0.25;
const LINE_PITCH: f32 = 1.2;

struct Line {
    baseline: f32,
    x0: f32,
    x1: f32,
    font_size: f32,
    runs: Vec<Run>,
}

fn round_half(v: f32) -> f32 {
    (v * 2.0).round() / 2.0
}

fn push_text(runs: &mut Vec<Run>, text: String, span: &TextSpan) {
    let font_size = round_half(span.font_size);
    if let Some(last) = runs.last_mut()
        && last.font_name == span.style.font_name
        && last.bold == span.style.bold
        && last.italic == span.style.italic
        && last.color == span.style.color
        && last.font_size == font_size
    {
        last.text.push_str(&text);
        return;
    }
    runs.push(Run {
        text,
        font_size,
        font_name: span.style.font_name.clone(),
        bold: span.style.bold,
        italic: span.style.italic,
        color: span.style.color,
    });
}

fn append_run(runs: &mut Vec<Run>, run: Run) {
    if let Some(last) = runs.last_mut()
        && last.font_name == run.font_name
        && last.bold == run.bold
        && last.italic == run.italic
        && last.color == run.color
        && last.font_size == run.font_size
    {
        last.text.push_str(&run.text);
        return;
    }
    runs.push(run);
}

fn joins_line(group: &[TextSpan], span: &TextSpan) -> bool {
    let size = group
        .iter()
        .map(|s| s.font_size)
        .fold(span.font_size, f32::max);
    (group[0].y - span.y).abs() <= size * 0.5
}

fn assemble_line(mut spans: Vec<TextSpan>) -> Line {
    spans.sort_by(|a, b| a.x.total_cmp(&b.x));

    let tallest = spans
        .iter()
        .max_by(|a, b| a.font_size.total_cmp(&b.font_size))
        .map_or((0.0, 0.0), |s| (s.y, s.font_size));
    let x0 = spans.first().map_or(0.0, |s| s.x);

    let mut runs: Vec<Run> = Vec::new();
    let mut end: Option<f32> = None;
    for span in &spans {
        let mut text = span.text.clone();
        if let Some(prev_end) = end
            && span.x - prev_end > span.font_size * 0.2
            && !text.starts_with(char::is_whitespace)
            && !runs
                .last()
                .is_some_and(|r| r.text.ends_with(char::is_whitespace))
        {
            text.insert(0, ' ');
        }
        let span_end = span.x + span.width;
        end = Some(end.map_or(span_end, |e| e.max(span_end)));
        push_text(&mut runs, text, span);
    }

    if let Some(first) = runs.first_mut() {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(last) = runs.last_mut() {
        last.text = last.text.trim_end().to_string();
    }
    runs.retain(|r| !r.text.is_empty());

    Line {
        baseline: tallest.0,
        x0,
        x1: end.unwrap_or(x0),
        font_size: tallest.1,
        runs,
    }
}

fn build_lines(mut spans: Vec<TextSpan>) -> Vec<Line> {
    spans.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut groups: Vec<Vec<TextSpan>> = Vec::new();
    for span in spans {
        match groups.last_mut() {
            Some(group) if joins_line(group, &span) => group.push(span),
            _ => groups.push(vec![span]),
        }
    }

    groups
        .into_iter()
        .map(assemble_line)
        .filter(|line| !line.runs.is_empty())
        .collect()
}

fn page_margins(lines: &[Line], width: f32, height: f32) -> Margins {
    if lines.is_empty() {
        return Margins::uniform(DEFAULT_MARGIN);
    }
    let left = lines.iter().map(|l| l.x0).fold(f32::MAX, f32::min);
    let right = lines.iter().map(|l| l.x1).fold(f32::MIN, f32::max);
    let top = lines
        .iter()
        .map(|l| l.baseline + l.font_size * ASCENT)
        .fold(f32::MIN, f32::max);
    let bottom = lines
        .iter()
        .map(|l| l.baseline - l.font_size * DESCENT)
        .fold(f32::MAX, f32::min);

    let clamp_h = |v: f32| v.clamp(0.0, width / 3.0);
    let clamp_v = |v: f32| v.clamp(0.0, height / 3.0);
    Margins {
        top: clamp_v(height - top),
        right: clamp_h(width - right),
        bottom: clamp_v(bottom),
        left: clamp_h(left),
    }
}

/// Left edge of a paragraph's body, ignoring a first-line indent.
fn body_left(lines: &[&Line]) -> f32 {
    let body = if lines.len() > 1 { &lines[1..] } else { lines };
    body.iter().map(|l| l.x0).fold(f32::MAX, f32::min)
}

fn starts_new_paragraph(current: &[&Line], next: &Line, text_right: f32) -> bool {
    let Some(prev) = current.last() else {
        return true;
    };
    let em = prev.font_size.max(1.0);
    let gap = prev.baseline - next.baseline;

    if gap <= 0.0 || gap > em * 1.6 {
        return true;
    }
    if (next.font_size - prev.font_size).abs() > 1.0 {
        return true;
    }
    if prev.x1 < text_right - em * 4.0 {
        return true;
    }
    if current.len() == 1 {
        // The first line may be indented relative to the body, not the other way round.
        next.x0 > prev.x0 + em * 1.5
    } else {
        (next.x0 - body_left(current)).abs() > em * 1.5
    }
}

fn alignment(lines: &[&Line], margins: &Margins, page_width: f32) -> Alignment {
    let right_edge = page_width - margins.right;
    let gaps = lines
        .iter()
        .map(|l| (l.x0 - margins.left, right_edge - l.x1, l.font_size.max(1.0)));

    if gaps.clone().all(|(lg, rg, em)| (lg - rg).abs() <= em && lg > em * 2.0) {
        Alignment::Center
    } else if gaps.clone().all(|(lg, rg, em)| rg < em && lg > em * 4.0) {
        Alignment::Right
    } else {
        Alignment::Left
    }
}

fn build_paragraph(
    lines: &[&Line],
    margins: &Margins,
    page_width: f32,
    previous_baseline: Option<f32>,
) -> Paragraph {
    let first = lines[0];

    let mut runs: Vec<Run> = Vec::new();
    for line in lines {
        if let Some(last) = runs.last_mut()
            && !last.text.ends_with('-')
            && !last.text.ends_with(char::is_whitespace)
        {
            last.text.push(' ');
        }
        for run in &line.runs {
            append_run(&mut runs, run.clone());
        }
    }

    let alignment = alignment(lines, margins, page_width);
    let (indent_left, indent_first_line) = if alignment == Alignment::Left {
        let body = body_left(lines);
        let first_line = first.x0 - body;
        (
            (body - margins.left).max(0.0),
            if first_line.abs() < 1.0 { 0.0 } else { first_line },
        )
    } else {
        (0.0, 0.0)
    };

    let space_before = previous_baseline
        .map(|prev| (prev - first.baseline - first.font_size * LINE_PITCH).max(0.0))
        .unwrap_or(0.0);

    Paragraph {
        runs,
        alignment,
        indent_left,
        indent_first_line,
        space_before,
    }
}

/// Rebuilds flowing paragraphs from the positioned spans of one page.
pub(crate) fn layout_page(text: PageText) -> Page {
    let lines = build_lines(text.spans);
    let margins = page_margins(&lines, text.width, text.height);
    let text_right = lines.iter().map(|l| l.x1).fold(0.0, f32::max);

    let mut groups: Vec<Vec<&Line>> = Vec::new();
    for line in &lines {
        match groups.last_mut() {
            Some(current) if !starts_new_paragraph(current, line, text_right) => current.push(line),
            _ => groups.push(vec![line]),
        }
    }

    let mut paragraphs = Vec::with_capacity(groups.len());
    let mut previous_baseline = None;
    for group in &groups {
        paragraphs.push(build_paragraph(group, &margins, text.width, previous_baseline));
        previous_baseline = group.last().map(|l| l.baseline);
    }

    Page {
        width: text.width,
        height: text.height,
        margins,
        paragraphs,
    }
}
