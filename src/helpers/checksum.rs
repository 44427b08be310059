//! Checksum and coordinate helpers shared by the sensor and modem readers.

const CRC8_POLYNOMIAL: u8 = 0x31;
const CRC8_INIT: u8 = 0xFF;

/// Sensirion CRC-8 (polynomial 0x31, seed 0xFF, no reflection, no final XOR)
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = CRC8_INIT;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Validate a Sensirion word: two data bytes followed by their CRC
pub fn crc8_word_ok(word: &[u8; 3]) -> bool {
    crc8(&word[..2]) == word[2]
}

/// Convert `dddmm.mmmm` (degrees and minutes) to signed decimal degrees.
///
/// Southern and western hemispheres are negative.
pub fn nmea_to_degrees(value: f64, hemisphere: char) -> f64 {
    let degrees = (value / 100.0).floor();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere.to_ascii_uppercase() {
        'S' | 'W' => -decimal,
        _ => decimal,
    }
}

/// Round to two decimals, the resolution readings are reported at
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
