use ab_glyph::{point, Font, FontRef, Glyph, PxScale, ScaleFont};
use anyhow::{Context, Result};
use shapecat_core::TaskPhase;
use tiny_skia::{Color, Pixmap, PixmapPaint, PremultipliedColorU8, Transform};

pub const CONSENT: &str = "Visual Categorization under Auditory Disruption\n\n\
Researchers: Cristobal Castillo, Mart\u{ed}n Montesinos, Antonia Olgu\u{ed}\n\
Purpose of the study: This study examines how an unexpected sound affects response time during a simple visual categorization task.\n\
What You Will Do: You will see shapes (circles or squares) on the screen and respond by pressing a key. Sometimes, you may hear a brief noise during the task. Your reaction time and accuracy will be recorded.\n\
Duration: The experiment will take approximately 10-15 minutes.\n\
Voluntary Participation: Your participation is entirely voluntary. You may withdraw at any time without penalty or explanation.\n\
Confidentiality: Your responses will be kept confidential and used only for research purposes.\n\
Risks and Benefits: There are no known risks associated with this task. Some sounds may be sudden, but not loud or harmful.\n\
Contact Information: If you have any questions or concerns, please contact the researchers at [aolgui@alumnos.uai.cl].\n\
By pressing ENTER, you agree to participate in this study.\n\n\
Press ENTER to continue.";

pub const INSTRUCTIONS: &str = "Categorization Task\n\n\
In this task, you will see a square or a circle.\n\
Press 'Z' for a square and 'M' for a circle.\n\
Respond as quickly and accurately as possible.\n\n\
Press SPACE to begin.";

pub const TRAINING_FAILED: &str =
    "Training failed. You did not reach the required accuracy.\nPlease try again.";

pub const VOLUME_ADJUST: &str = "Adjust the noise volume with the LEFT and RIGHT arrow keys.\n\
Press 'P' to play the noise and SPACE to confirm.\n\
The volume should be bothersome but not hurtful.";

pub const TESTING_INSTRUCTIONS: &str = "Great job!\n\n\
Now you will do the same task, but sometimes there will be noise.\n\n\
Press SPACE to continue.";

pub const COMPLETE: &str = "Experiment completed. Thank you!";

pub const CORRECT: &str = "Correct!";
pub const INCORRECT: &str = "Incorrect!";

/// Text shown on a non-trial screen
pub fn screen_text(phase: TaskPhase) -> Option<&'static str> {
    match phase {
        TaskPhase::Consent => Some(CONSENT),
        TaskPhase::Instructions => Some(INSTRUCTIONS),
        TaskPhase::TrainingFailed => Some(TRAINING_FAILED),
        TaskPhase::VolumeAdjust => Some(VOLUME_ADJUST),
        TaskPhase::TestingInstructions => Some(TESTING_INSTRUCTIONS),
        TaskPhase::Complete => Some(COMPLETE),
        TaskPhase::Training | TaskPhase::Testing => None,
    }
}

fn layout(text: &str, font_size: f32, font: &FontRef<'static>) -> (Vec<Glyph>, f32) {
    let scale = PxScale::from(font_size);
    let sf = font.as_scaled(scale);

    let mut pen_x = 0.0f32;
    let mut glyphs = Vec::<Glyph>::with_capacity(text.len());
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = glyphs.last() {
            pen_x += sf.kern(prev.id, id);
        }
        glyphs.push(Glyph {
            id,
            scale,
            position: point(pen_x, sf.ascent()),
        });
        pen_x += sf.h_advance(id);
    }
    (glyphs, pen_x)
}

/// Advance width of a single line
pub fn measure(text: &str, font_size: f32, font: &FontRef<'static>) -> f32 {
    layout(text, font_size, font).1
}

/// Renders one line with its baseline at the font ascent, so lines of
/// the same size share a height.
pub fn render_text_pixmap(
    text: &str,
    font_size: f32,
    font: &FontRef<'static>,
    color: Color,
) -> Result<Pixmap> {
    let (glyphs, advance) = layout(text, font_size, font);
    let sf = font.as_scaled(PxScale::from(font_size));

    let w = advance.ceil().max(1.0) as u32;
    let h = (sf.ascent() - sf.descent()).ceil().max(1.0) as u32;
    let mut pm = Pixmap::new(w, h).context("text pixmap has zero size")?;

    let stride = w as usize;
    let dst = pm.pixels_mut();
    let cu = color.to_color_u8();

    for g in glyphs {
        let Some(out) = font.outline_glyph(g) else {
            continue;
        };
        let b = out.px_bounds();
        out.draw(|x, y, cov| {
            if cov <= f32::EPSILON {
                return;
            }
            let ix = (x as f32 + b.min.x).floor() as i32;
            let iy = (y as f32 + b.min.y).floor() as i32;
            if ix < 0 || iy < 0 || ix >= w as i32 || iy >= h as i32 {
                return;
            }
            let i = iy as usize * stride + ix as usize;

            let a = (cov * cu.alpha() as f32 / 255.0).clamp(0.0, 1.0);
            let src = [
                (cu.red() as f32 * a) as u8,
                (cu.green() as f32 * a) as u8,
                (cu.blue() as f32 * a) as u8,
                (a * 255.0) as u8,
            ];
            let bg = dst[i];
            let inv = 1.0 - a;
            // Porter-Duff over, premultiplied
            let blended = PremultipliedColorU8::from_rgba(
                src[0].saturating_add((bg.red() as f32 * inv) as u8),
                src[1].saturating_add((bg.green() as f32 * inv) as u8),
                src[2].saturating_add((bg.blue() as f32 * inv) as u8),
                src[3].saturating_add((bg.alpha() as f32 * inv) as u8),
            );
            if let Some(px) = blended {
                dst[i] = px;
            }
        });
    }

    Ok(pm)
}

/// Splits on newlines, then greedily fills each line up to `max_width` pixels
pub fn wrap_lines(
    text: &str,
    font_size: f32,
    font: &FontRef<'static>,
    max_width: Option<f32>,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let Some(max_width) = max_width else {
            lines.push(paragraph.to_string());
            continue;
        };
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if line.is_empty() {
                line.push_str(word);
                continue;
            }
            let candidate = format!("{line} {word}");
            if measure(&candidate, font_size, font) <= max_width {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            }
        }
        lines.push(line);
    }
    lines
}

/// Renders centred, wrapped multi-line text into one pixmap
pub fn render_text_block(
    text: &str,
    font_size: f32,
    font: &FontRef<'static>,
    color: Color,
    wrap_width: Option<f32>,
) -> Result<Pixmap> {
    let rendered = wrap_lines(text, font_size, font, wrap_width)
        .iter()
        .map(|line| render_text_pixmap(line, font_size, font, color))
        .collect::<Result<Vec<_>>>()?;

    let line_height = rendered.iter().map(Pixmap::height).max().unwrap_or(1);
    let width = rendered.iter().map(Pixmap::width).max().unwrap_or(1);
    let height = line_height * rendered.len().max(1) as u32;
    let mut block = Pixmap::new(width, height).context("text block has zero size")?;

    for (i, line) in rendered.iter().enumerate() {
        let x = (width - line.width()) / 2;
        block.draw_pixmap(
            x as i32,
            (i as u32 * line_height) as i32,
            line.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font() -> FontRef<'static> {
        crate::render::load_font().unwrap()
    }

    #[test]
    fn test_every_screen_phase_has_text() {
        assert!(screen_text(TaskPhase::Consent).unwrap().contains("ENTER"));
        assert!(screen_text(TaskPhase::Instructions).unwrap().contains("'Z' for a square"));
        assert!(screen_text(TaskPhase::TestingInstructions).unwrap().starts_with("Great job!"));
        assert_eq!(screen_text(TaskPhase::Training), None);
        assert_eq!(screen_text(TaskPhase::Testing), None);
    }

    #[test]
    fn test_consent_names_researchers_and_contact() {
        let text = screen_text(TaskPhase::Consent).unwrap();
        assert!(text.lines().any(|l| l.starts_with("Researchers: ")));
        assert!(text.contains("aolgui@alumnos.uai.cl"));
        let contact = text.find("Contact Information").unwrap();
        assert!(contact < text.find("By pressing ENTER").unwrap());
    }

    #[test]
    fn test_wrap_respects_width() {
        let font = font();
        let lines = wrap_lines(CONSENT, 14.0, &font, Some(300.0));
        assert!(lines.len() > CONSENT.lines().count());
        for line in &lines {
            if line.contains(' ') {
                assert!(measure(line, 14.0, &font) <= 300.0, "{line}");
            }
        }
    }

    #[test]
    fn test_unwrapped_keeps_paragraphs() {
        let lines = wrap_lines(TRAINING_FAILED, 20.0, &font(), None);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "Please try again.");
    }

    #[test]
    fn test_block_height_is_line_multiple() {
        let font = font();
        let one = render_text_pixmap("Please try again.", 20.0, &font, Color::WHITE).unwrap();
        let block = render_text_block(TRAINING_FAILED, 20.0, &font, Color::WHITE, None).unwrap();
        assert_eq!(block.height(), one.height() * 2);
        assert!(block.width() >= one.width());
    }

    #[test]
    fn test_text_has_coverage_in_color() {
        let pm = render_text_pixmap(CORRECT, 32.0, &font(), Color::from_rgba8(0, 255, 0, 255))
            .unwrap();
        assert!(pm.pixels().iter().any(|p| p.green() > 200));
        assert!(pm.pixels().iter().all(|p| p.red() == 0 && p.blue() == 0));
    }
}
