// THEORY (single-pixel color space):
// Team classification works in hue/saturation/value space because jersey colors
// are far more separable by hue than by raw RGB under changing pitch lighting.
// This module converts one RGB pixel to HSV using the 8-bit convention that the
// calibration files are written in:
//
//   H in [0, 179]  (degrees / 2, so a full turn fits in a byte)
//   S in [0, 255]  (chroma / value, scaled)
//   V in [0, 255]  (max channel)
//
// Like the rest of the 1D helpers it never looks at neighbors; region-level logic
// (counting pixels inside a range) lives in `color_classifier`.

pub mod hsv {
    use image::Rgb;

    /// One pixel in 8-bit HSV.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hsv {
        pub hue: u8,
        pub saturation: u8,
        pub value: u8,
    }

    impl Hsv {
        pub fn as_array(&self) -> [u8; 3] {
            [self.hue, self.saturation, self.value]
        }
    }

    impl From<Rgb<u8>> for Hsv {
        fn from(pixel: Rgb<u8>) -> Self {
            let [red, green, blue] = pixel.0;
            let (r, g, b) = (red as f32, green as f32, blue as f32);

            let maximum_channel = r.max(g.max(b));
            let minimum_channel = r.min(g.min(b));
            let chroma = maximum_channel - minimum_channel;

            let saturation = if maximum_channel > 0.0 {
                255.0 * chroma / maximum_channel
            } else {
                0.0
            };

            let mut hue_degrees = if chroma <= f32::EPSILON {
                0.0
            } else if maximum_channel == r {
                60.0 * (g - b) / chroma
            } else if maximum_channel == g {
                120.0 + 60.0 * (b - r) / chroma
            } else {
                240.0 + 60.0 * (r - g) / chroma
            };
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }

            // 360 degrees would round to 180, which is outside the byte range.
            let hue = ((hue_degrees / 2.0).round() as u16 % 180) as u8;

            Hsv {
                hue,
                saturation: saturation.round().clamp(0.0, 255.0) as u8,
                value: maximum_channel as u8,
            }
        }
    }
}
