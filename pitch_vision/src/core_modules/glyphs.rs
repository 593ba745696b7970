// Minimal bitmap digits for the player id labels.
//
// Ids are non-negative integers, so a 3x5 digit font covers every label the
// compositor draws. Non-digit characters are skipped.

use image::{Rgb, RgbImage};

const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;

/// Rows of each digit, top to bottom; bit 2 is the leftmost column.
const DIGITS: [[u8; GLYPH_HEIGHT as usize]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b001, 0b001, 0b001],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Pixel size of `text` rendered at `scale`, one scaled column of spacing
/// between digits.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count() as u32;
    if digits == 0 {
        return (0, 0);
    }
    let width = digits * GLYPH_WIDTH * scale + (digits - 1) * scale;
    (width, GLYPH_HEIGHT * scale)
}

/// Draw the digits of `text` with their top-left corner at `(x, y)`. Pixels
/// falling outside the image are skipped.
pub fn draw_digits(image: &mut RgbImage, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1) as i32;
    let advance = (GLYPH_WIDTH as i32 + 1) * scale;
    let digits = text.chars().filter_map(|c| c.to_digit(10));

    for (position, digit) in digits.enumerate() {
        let origin_x = x + position as i32 * advance;
        for (row, bits) in DIGITS[digit as usize].iter().enumerate() {
            for col in 0..GLYPH_WIDTH as i32 {
                if bits & (1 << (GLYPH_WIDTH as i32 - 1 - col)) == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = y + row as i32 * scale;
                fill_block(image, px, py, scale, color);
            }
        }
    }
}

fn fill_block(image: &mut RgbImage, x: i32, y: i32, size: i32, color: Rgb<u8>) {
    for yy in y.max(0)..(y + size).min(image.height() as i32) {
        for xx in x.max(0)..(x + size).min(image.width() as i32) {
            image.put_pixel(xx as u32, yy as u32, color);
        }
    }
}
