//! End-to-end image conversion properties: mode selection, size-search
//! bounds, and codec/settings agreement.

mod support;

use mediaconv_core::error::ConvertError;
use mediaconv_core::image::{ImageEncodeSettings, ImageFormat, convert_image};
use mediaconv_core::settings::ControlMode;

use support::{FakeImageCodec, init_test_logging};

const INPUT: &[u8] = b"fake image payload";

#[tokio::test]
async fn quality_mode_encodes_exactly_once() {
    init_test_logging();
    let codec = FakeImageCodec::new(ImageFormat::Jpeg, |q| 100 + q as u64);
    let settings = ImageEncodeSettings {
        format: ImageFormat::Jpeg,
        quality: 80,
        ..Default::default()
    };

    let output = convert_image(&codec, &settings, "photo.png", INPUT, None)
        .await
        .unwrap();

    assert_eq!(output.suggested_name, "photo_conv.jpg");
    assert_eq!(output.quality, 80);
    assert!(!output.degraded);
    assert_eq!(codec.encode_count(), 1);
}

#[tokio::test]
async fn size_mode_lands_at_or_under_target() {
    // 1 KB at quality 0 up to ~1001 KB at quality 100.
    let codec = FakeImageCodec::new(ImageFormat::Webp, |q| 1024 + 10_240 * q as u64);
    let settings = ImageEncodeSettings {
        format: ImageFormat::Webp,
        mode: ControlMode::Size,
        target_kb: 500,
        ..Default::default()
    };

    let output = convert_image(&codec, &settings, "photo.png", INPUT, None)
        .await
        .unwrap();

    assert!(!output.degraded);
    assert!(output.bytes.len() as u64 <= 500 * 1024);
    // Within the 5% slack band below target.
    assert!(output.bytes.len() as u64 > (500 * 1024) * 95 / 100);
    assert!(codec.encode_count() <= 11);
}

#[tokio::test]
async fn unreachable_target_degrades_to_quality_zero() {
    let codec = FakeImageCodec::new(ImageFormat::Webp, |_| 10 * 1024 * 1024);
    let settings = ImageEncodeSettings {
        format: ImageFormat::Webp,
        mode: ControlMode::Size,
        target_kb: 100,
        ..Default::default()
    };

    let output = convert_image(&codec, &settings, "photo.png", INPUT, None)
        .await
        .unwrap();

    assert!(output.degraded);
    assert_eq!(output.quality, 0);
    assert!(codec.encode_count() <= 11);
}

#[tokio::test]
async fn lossless_target_ignores_size_mode() {
    let codec = FakeImageCodec::new(ImageFormat::Png, |_| 4096);
    let settings = ImageEncodeSettings {
        format: ImageFormat::Png,
        mode: ControlMode::Size,
        quality: 90,
        ..Default::default()
    };

    let output = convert_image(&codec, &settings, "photo.jpg", INPUT, None)
        .await
        .unwrap();

    assert_eq!(output.suggested_name, "photo_conv.png");
    assert_eq!(codec.encode_count(), 1, "no search for lossless formats");
    assert!(!output.degraded);
}

#[tokio::test]
async fn avif_encodes_carry_the_speed_hint() {
    let codec = FakeImageCodec::new(ImageFormat::Avif, |q| 100 + q as u64);
    let settings = ImageEncodeSettings {
        format: ImageFormat::Avif,
        ..Default::default()
    };

    convert_image(&codec, &settings, "photo.png", INPUT, None)
        .await
        .unwrap();

    assert_eq!(codec.last_speed_hint(), Some(Some(4)));
}

#[tokio::test]
async fn codec_and_settings_format_must_agree() {
    let codec = FakeImageCodec::new(ImageFormat::Jpeg, |q| 100 + q as u64);
    let settings = ImageEncodeSettings {
        format: ImageFormat::Webp,
        ..Default::default()
    };

    let err = convert_image(&codec, &settings, "photo.png", INPUT, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedFormat(_)));
    assert_eq!(codec.encode_count(), 0);
}
