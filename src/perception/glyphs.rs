/// Minimal bitmap digits for drawing numeric labels onto screenshots.
///
/// Grid cells and set-of-marks tags are both plain numbers, so only '0'–'9'
/// are needed. Each glyph: 5 rows, each row is a u8 where bit4=leftmost pixel.
const DIGITS_5X5: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];

fn char_to_glyph(c: char) -> Option<&'static [u8; 5]> {
    let digit = c.to_digit(10)? as usize;
    DIGITS_5X5.get(digit)
}

/// Pixel width of `label` when drawn at `scale`.
pub fn label_width(label: &str, scale: u32) -> u32 {
    let n = label.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    n * (5 * scale + 1) - 1
}

/// Draw one digit at (px, py). Pixels outside the canvas are clipped.
fn draw_glyph(canvas: &mut image::RgbaImage, c: char, px: u32, py: u32, scale: u32, fg: [u8; 3]) {
    let Some(glyph) = char_to_glyph(c) else { return };
    let (w, h) = canvas.dimensions();

    for (row, &bits) in glyph.iter().enumerate() {
        for col in 0..5u32 {
            if (bits >> (4 - col)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + col * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        let p = canvas.get_pixel_mut(x, y);
                        p[0] = fg[0];
                        p[1] = fg[1];
                        p[2] = fg[2];
                        p[3] = 255;
                    }
                }
            }
        }
    }
}

/// Draw `label` on a filled background box whose top-left corner is (px, py).
pub fn draw_label(
    canvas: &mut image::RgbaImage,
    label: &str,
    px: u32,
    py: u32,
    scale: u32,
    fg: [u8; 3],
    bg: [u8; 4],
) {
    let pad = 2u32;
    let box_w = label_width(label, scale) + pad * 2;
    let box_h = 5 * scale + pad * 2;
    fill_rect(canvas, px, py, box_w, box_h, bg);

    let char_step = 5 * scale + 1;
    for (i, c) in label.chars().enumerate() {
        draw_glyph(canvas, c, px + pad + i as u32 * char_step, py + pad, scale, fg);
    }
}

pub fn fill_rect(canvas: &mut image::RgbaImage, x: u32, y: u32, w: u32, h: u32, colour: [u8; 4]) {
    let (cw, ch) = canvas.dimensions();
    for dy in 0..h {
        for dx in 0..w {
            let (px, py) = (x + dx, y + dy);
            if px < cw && py < ch {
                blend_pixel(canvas.get_pixel_mut(px, py), colour);
            }
        }
    }
}

/// Rectangle outline of the given thickness, drawn inward from the box edges.
pub fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    colour: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (w, h) = (w as i32, h as i32);
    let mut put = |x: i32, y: i32| {
        if x >= 0 && y >= 0 && x < w && y < h {
            blend_pixel(canvas.get_pixel_mut(x as u32, y as u32), colour);
        }
    };
    for t in 0..thickness {
        for x in x1..=x2 {
            put(x, y1 + t);
            put(x, y2 - t);
        }
        for y in y1..=y2 {
            put(x1 + t, y);
            put(x2 - t, y);
        }
    }
}

pub fn blend_pixel(pixel: &mut image::Rgba<u8>, colour: [u8; 4]) {
    let alpha = colour[3] as f32 / 255.0;
    for c in 0..3 {
        pixel[c] = (pixel[c] as f32 * (1.0 - alpha) + colour[c] as f32 * alpha).round() as u8;
    }
    // alpha channel intentionally preserved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_width_accounts_for_gaps() {
        assert_eq!(label_width("", 2), 0);
        assert_eq!(label_width("7", 1), 5);
        assert_eq!(label_width("12", 2), 21);
    }

    #[test]
    fn labels_are_clipped_at_canvas_edge() {
        let mut canvas = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 255]));
        draw_label(&mut canvas, "88", 4, 4, 2, [255, 255, 255], [0, 0, 0, 255]);
        assert_eq!(canvas.dimensions(), (8, 8));
    }
}
