use chapter_image_translator::error::Error;
use chapter_image_translator::overlay::{
    BBoxPx, Compositor, ImageResource, LayoutRect, OverlayFont, OverlayStyle, RenderMode,
    RenderRequest, TextRegion,
};
use image::{Rgba, RgbaImage};

fn compositor() -> Compositor {
    Compositor::new(OverlayFont::estimated(), OverlayStyle::default())
}

fn source(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 200) as u8, (y * 5 % 180) as u8, 40, 255])
    })
}

fn region(x: u32, y: u32, w: u32, h: u32) -> TextRegion {
    TextRegion::new(BBoxPx { x, y, w, h }, "안녕하세요")
}

fn render(
    compositor: &Compositor,
    image: &ImageResource,
    regions: &[TextRegion],
    mode: RenderMode,
) -> RgbaImage {
    compositor
        .render(&RenderRequest {
            image,
            regions,
            mode,
        })
        .expect("render")
}

/// A pixel fully inside the left padding strip of a mask, halfway down.
fn left_padding_pixel(mask: &LayoutRect) -> (u32, u32) {
    let x = (mask.x + 1.0).floor() as u32;
    let y = (mask.y + mask.h * 0.5).floor() as u32;
    (x, y)
}

fn is_masked(pixel: &Rgba<u8>) -> bool {
    pixel.0[0] >= 240 && pixel.0[1] >= 240 && pixel.0[2] >= 240
}

#[test]
fn original_mode_is_a_plain_copy() {
    let image = ImageResource::Ready(source(120, 80));
    let regions = vec![
        region(10, 10, 80, 20).with_translation("Hello there friend"),
        region(10, 40, 60, 20).with_translation("Bye"),
    ];
    let output = render(&compositor(), &image, &regions, RenderMode::Original);
    assert_eq!(&output, image.ready().unwrap());
}

#[test]
fn rendering_is_idempotent() {
    let image = ImageResource::Ready(source(160, 100));
    let regions = vec![
        region(10, 10, 80, 20).with_translation("Hello there friend"),
        region(30, 50, 100, 30).with_translation("What are you doing here?"),
    ];
    let compositor = compositor();
    let first = render(&compositor, &image, &regions, RenderMode::Translated);
    let second = render(&compositor, &image, &regions, RenderMode::Translated);
    assert_eq!(first.dimensions(), (160, 100));
    assert_eq!(first.as_raw(), second.as_raw());
}

#[test]
fn untranslated_regions_are_left_untouched() {
    let image = ImageResource::Ready(source(120, 80));
    let mut blank = region(10, 10, 80, 20);
    blank.translated_text = Some("  \n ".to_string());
    let regions = vec![
        region(0, 0, 50, 20),
        region(20, 30, 60, 20).with_translation(""),
        blank,
    ];
    let output = render(&compositor(), &image, &regions, RenderMode::Translated);
    assert_eq!(&output, image.ready().unwrap());
}

#[test]
fn untranslated_region_keeps_pixels_next_to_translated_one() {
    let image = ImageResource::Ready(source(200, 120));
    let untouched = region(120, 70, 60, 30);
    let regions = vec![
        region(10, 10, 80, 20).with_translation("Hello"),
        untouched.clone(),
    ];
    let output = render(&compositor(), &image, &regions, RenderMode::Translated);
    let original = image.ready().unwrap();
    let b = untouched.bounds;
    for y in b.y..b.y + b.h {
        for x in b.x..b.x + b.w {
            assert_eq!(output.get_pixel(x, y), original.get_pixel(x, y));
        }
    }
}

#[test]
fn translucent_pixels_outside_the_overlay_keep_their_exact_value() {
    let translucent = RgbaImage::from_fn(200, 100, |x, y| {
        Rgba([200, (y * 2 % 256) as u8, (x % 7) as u8 * 3, (x % 256) as u8])
    });
    let image = ImageResource::Ready(translucent.clone());
    let untouched = region(120, 60, 60, 30);
    let regions = vec![
        region(10, 10, 80, 20).with_translation("Hi"),
        untouched.clone(),
    ];
    let compositor = compositor();
    let mask = compositor.layout(&regions).remove(0).mask;
    let output = render(&compositor, &image, &regions, RenderMode::Translated);

    let b = untouched.bounds;
    for y in b.y..b.y + b.h {
        for x in b.x..b.x + b.w {
            assert_eq!(output.get_pixel(x, y), translucent.get_pixel(x, y), "{},{}", x, y);
        }
    }
    // Fully transparent pixels keep their color channels too.
    assert_eq!(output.get_pixel(0, 50), translucent.get_pixel(0, 50));
    // Covered pixels end up at least as opaque as the mask.
    let (x, y) = left_padding_pixel(&mask);
    assert!(output.get_pixel(x, y).0[3] >= 242, "{:?}", output.get_pixel(x, y));
}

#[test]
fn translated_region_gets_a_centered_mask() {
    let image = ImageResource::Ready(source(120, 60));
    let regions = vec![region(10, 10, 80, 20).with_translation("Hello there friend")];
    let compositor = compositor();
    let layout = compositor.layout(&regions).remove(0);
    let (cx, cy) = layout.mask.center();
    assert!((cx - 50.0).abs() < 1e-3);
    assert!((cy - 20.0).abs() < 1e-3);

    let output = render(&compositor, &image, &regions, RenderMode::Translated);
    let (x, y) = left_padding_pixel(&layout.mask);
    assert!(is_masked(output.get_pixel(x, y)), "pixel {},{} not masked", x, y);
    // Far corner of the image stays as it was.
    assert_eq!(output.get_pixel(119, 59), image.ready().unwrap().get_pixel(119, 59));
}

fn dark_pixels_inside(image: &RgbaImage, rect: &LayoutRect) -> Vec<(u32, u32)> {
    let x0 = rect.x.ceil().max(0.0) as u32;
    let y0 = rect.y.ceil().max(0.0) as u32;
    let x1 = ((rect.x + rect.w).floor() as u32).min(image.width());
    let y1 = ((rect.y + rect.h).floor() as u32).min(image.height());
    let mut dark = Vec::new();
    for y in y0..y1 {
        for x in x0..x1 {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            if r < 128 && g < 128 && b < 128 {
                dark.push((x, y));
            }
        }
    }
    dark
}

#[test]
fn later_region_paints_over_earlier_one() {
    let image = ImageResource::Ready(source(240, 120));
    let long = region(20, 30, 200, 60).with_translation("a rather long sentence spanning the box");
    let short = region(80, 45, 80, 30).with_translation("B");
    let compositor = compositor();
    let stacked = vec![long.clone(), short.clone()];
    let layouts = compositor.layout(&stacked);
    assert_eq!(layouts.len(), 2);
    assert_eq!(layouts[0].index, 0);
    assert_eq!(layouts[1].index, 1);

    let output = render(&compositor, &image, &stacked, RenderMode::Translated);
    let swapped = render(&compositor, &image, &[short, long], RenderMode::Translated);

    // Inside the second mask only its own glyph may be dark; the first
    // region's text underneath is washed out by the mask.
    let top = &layouts[1];
    let glyph_area = LayoutRect {
        x: top.text_box.x - 1.0,
        y: top.text_box.y - 1.0,
        w: top.text_box.w + 2.0,
        h: top.text_box.h + 2.0,
    };
    for (x, y) in dark_pixels_inside(&output, &top.mask) {
        assert!(
            x as f32 >= glyph_area.x
                && x as f32 <= glyph_area.x + glyph_area.w
                && y as f32 >= glyph_area.y
                && y as f32 <= glyph_area.y + glyph_area.h,
            "dark pixel {},{} outside the top glyph",
            x,
            y
        );
    }

    // Glyphs only show up when the host has a sans-serif face.
    if !dark_pixels_inside(&output, &layouts[0].mask).is_empty() {
        assert_ne!(output, swapped);
        assert_ne!(
            dark_pixels_inside(&output, &top.mask),
            dark_pixels_inside(&swapped, &top.mask)
        );
    }
}

#[test]
fn region_outside_canvas_is_not_an_error() {
    let image = ImageResource::Ready(source(50, 50));
    let regions = vec![region(400, 400, 80, 20).with_translation("Far away")];
    let output = render(&compositor(), &image, &regions, RenderMode::Translated);
    assert_eq!(&output, image.ready().unwrap());
}

#[test]
fn undecoded_image_is_not_ready() {
    let regions = vec![region(0, 0, 10, 10).with_translation("Hi")];
    let err = compositor()
        .render(&RenderRequest {
            image: &ImageResource::Pending,
            regions: &regions,
            mode: RenderMode::Translated,
        })
        .unwrap_err();
    assert!(matches!(err, Error::ImageNotReady));
}

#[test]
fn broken_image_fails_to_load() {
    let image = ImageResource::decode(b"\x89PNG truncated");
    let err = compositor()
        .render(&RenderRequest {
            image: &image,
            regions: &[],
            mode: RenderMode::Original,
        })
        .unwrap_err();
    assert!(matches!(err, Error::ImageLoadFailed(_)));
}

#[test]
fn decoded_png_renders_at_source_size() {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(source(64, 32))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode");
    let image = ImageResource::decode(&bytes);
    let regions = vec![region(4, 4, 56, 24).with_translation("Hi")];
    let output = render(&compositor(), &image, &regions, RenderMode::Translated);
    assert_eq!(output.dimensions(), (64, 32));
}
