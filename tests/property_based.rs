use proptest::prelude::*;
use webp_bridge::{
    decode_rgba, decode_yuva, encode_to_vec, output_size, AlphaMode, DecodeOptions, EncodeConfig,
    PlaneLayout, Rect, RgbaBuffer,
};

fn rect_strategy() -> impl Strategy<Value = Rect> {
    (0u32..=512, 0u32..=512, 0u32..=512, 0u32..=512)
        .prop_map(|(x0, y0, x1, y1)| Rect::new(x0, y0, x1, y1))
}

fn rgba_strategy() -> impl Strategy<Value = RgbaBuffer> {
    (1u32..=24, 1u32..=24).prop_flat_map(|(w, h)| {
        proptest::collection::vec(any::<u8>(), (w * h * 4) as usize).prop_map(move |pixels| {
            RgbaBuffer::from_raw(w, h, w as usize * 4, pixels, AlphaMode::Straight).unwrap()
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_rect_is_normalized(rect in rect_strategy()) {
        prop_assert!(rect.min_x <= rect.max_x);
        prop_assert!(rect.min_y <= rect.max_y);
        prop_assert_eq!(rect.is_empty(), rect.width() == 0 || rect.height() == 0);
    }

    #[test]
    fn prop_plane_layout_is_exact(rect in rect_strategy(), has_alpha in any::<bool>()) {
        let layout = PlaneLayout::compute(rect, has_alpha);
        let (w, h) = (rect.width() as usize, rect.height() as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        prop_assert_eq!(layout.y_len(), w * h);
        prop_assert_eq!(layout.c_len(), cw * ch);
        prop_assert_eq!(layout.a_len(), if has_alpha { w * h } else { 0 });
        prop_assert_eq!(
            layout.total_len(),
            layout.y_len() + 2 * layout.c_len() + layout.a_len()
        );
        prop_assert!(layout.cb_offset() <= layout.cr_offset());
        prop_assert!(layout.cr_offset() <= layout.a_offset());
        prop_assert_eq!(layout.a_offset() + layout.a_len(), layout.total_len());
    }

    #[test]
    fn prop_chroma_ignores_origin(
        w in 0u32..=300,
        h in 0u32..=300,
        dx in 0u32..=7,
        dy in 0u32..=7,
    ) {
        let at_origin = PlaneLayout::compute(Rect::from_size(w, h), false);
        let shifted = PlaneLayout::compute(Rect::new(dx, dy, dx + w, dy + h), false);
        prop_assert_eq!(at_origin, shifted);
    }

    #[test]
    fn prop_output_size_precedence(
        probed_w in 1u32..=4096,
        probed_h in 1u32..=4096,
        crop in rect_strategy(),
        scale in rect_strategy(),
    ) {
        let options = DecodeOptions { crop, scale, ..Default::default() };
        let size = output_size((probed_w, probed_h), &options);
        let expected = if !scale.is_empty() {
            (scale.width(), scale.height())
        } else if !crop.is_empty() {
            (crop.width(), crop.height())
        } else {
            (probed_w, probed_h)
        };
        prop_assert_eq!(size, expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_lossless_exact_round_trip(source in rgba_strategy()) {
        let mut config = EncodeConfig::lossless_preset(2).unwrap();
        config.set_exact(true);
        let data = encode_to_vec(&source, &config).unwrap();
        let decoded = decode_rgba(&data, &DecodeOptions::default()).unwrap();
        prop_assert_eq!(decoded.as_bytes(), source.as_bytes());
    }

    #[test]
    fn prop_planar_decode_matches_geometry(source in rgba_strategy()) {
        let config = EncodeConfig::preset(Default::default(), 50.0).unwrap();
        let data = encode_to_vec(&source, &config).unwrap();
        let planar = decode_yuva(&data, &DecodeOptions::default()).unwrap();
        let layout = PlaneLayout::compute(Rect::from_size(source.width(), source.height()), planar.a().is_some());
        prop_assert_eq!(planar.as_bytes().len(), layout.total_len());
    }
}
