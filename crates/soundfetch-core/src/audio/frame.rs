//! MPEG audio frame header arithmetic.

pub(crate) const HEADER_BYTES: usize = 4;
pub(crate) const ID3V1_TAG_BYTES: usize = 128;

/// Bitrates in kbps for indices 1..=14, by table then layer I, II, III.
const BITRATES_KBPS: [[[u16; 14]; 3]; 2] = [
    // MPEG-1
    [
        [32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
        [32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
        [32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
    ],
    // MPEG-2 and 2.5
    [
        [32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
        [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
        [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    ],
];
const MPEG1_RATES_HZ: [u32; 3] = [44_100, 48_000, 32_000];

/// Length of the frame whose header starts `bytes`, padding included.
///
/// `None` for free-format, reserved or malformed headers.
pub(crate) fn frame_len(bytes: &[u8]) -> Option<usize> {
    let header: [u8; HEADER_BYTES] = bytes.get(..HEADER_BYTES)?.try_into().ok()?;
    let [sync, b1, b2, _] = header;
    if sync != 0xFF || b1 & 0xE0 != 0xE0 {
        return None;
    }

    let version = (b1 >> 3) & 0b11;
    let layer = (b1 >> 1) & 0b11;
    let bitrate_index = usize::from(b2 >> 4);
    let rate_index = usize::from((b2 >> 2) & 0b11);
    if version == 1 || layer == 0 || bitrate_index == 0 || bitrate_index == 15 || rate_index == 3
    {
        return None;
    }

    let mpeg1 = version == 3;
    let sample_rate = match version {
        3 => MPEG1_RATES_HZ[rate_index],
        2 => MPEG1_RATES_HZ[rate_index] / 2,
        _ => MPEG1_RATES_HZ[rate_index] / 4,
    };
    // 0 = layer I, 2 = layer III
    let layer_slot = usize::from(3 - layer);
    let table = if mpeg1 { 0 } else { 1 };
    let bitrate = u32::from(BITRATES_KBPS[table][layer_slot][bitrate_index - 1]) * 1000;
    let padding = u32::from((b2 >> 1) & 1);

    let len = match layer_slot {
        0 => (12 * bitrate / sample_rate + padding) * 4,
        2 if !mpeg1 => 72 * bitrate / sample_rate + padding,
        _ => 144 * bitrate / sample_rate + padding,
    };
    Some(len as usize)
}
