//! Field extraction for the two GNSS response dialects.

use crate::data_mgmt::models::Fix;
use crate::helpers::checksum::nmea_to_degrees;

pub const DEFAULT_FIX_ACCURACY: f64 = 30.0;
/// Accuracy estimate per unit of horizontal dilution of precision
const HDOP_SCALE: f64 = 5.0;
const MAX_PLAUSIBLE_HDOP: f64 = 100.0;

const CGNSINF_TAG: &str = "+CGNSINF:";
const CGPSINFO_TAG: &str = "+CGPSINFO:";
const CGNSPWR_TAG: &str = "+CGNSPWR:";

// +CGNSINF: <run>,<fix>,<utc>,<lat>,<lon>,<alt>,<speed>,<course>,<mode>,<reserved>,<hdop>,...
const CGNSINF_FIX_STATUS: usize = 1;
const CGNSINF_LAT: usize = 3;
const CGNSINF_LON: usize = 4;
const CGNSINF_HDOP: usize = 10;

/// Comma separated fields following `tag` on the first line that carries it
fn fields_after<'a>(response: &'a str, tag: &str) -> Option<Vec<&'a str>> {
    response.lines().find_map(|line| {
        let idx = line.find(tag)?;
        Some(
            line[idx + tag.len()..]
                .split(',')
                .map(str::trim)
                .collect(),
        )
    })
}

fn number(field: Option<&&str>) -> Option<f64> {
    field
        .and_then(|f| f.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Profile A (`AT+CGNSINF`). A fix requires the status field to be `1`.
pub fn parse_cgnsinf(response: &str) -> Option<Fix> {
    let fields = fields_after(response, CGNSINF_TAG)?;
    if fields.get(CGNSINF_FIX_STATUS).copied() != Some("1") {
        return None;
    }
    let lat = number(fields.get(CGNSINF_LAT))?;
    let lng = number(fields.get(CGNSINF_LON))?;
    let accuracy = number(fields.get(CGNSINF_HDOP))
        .filter(|hdop| *hdop > 0.0 && *hdop <= MAX_PLAUSIBLE_HDOP)
        .map(|hdop| hdop * HDOP_SCALE)
        .unwrap_or(DEFAULT_FIX_ACCURACY);
    Some(Fix::gnss(lat, lng, accuracy))
}

/// Profile B (`AT+CGPSINFO?`): `ddmm.mmmm,N,dddmm.mmmm,E,...`
pub fn parse_cgpsinfo(response: &str) -> Option<Fix> {
    let fields = fields_after(response, CGPSINFO_TAG)?;
    let lat = number(fields.first())?;
    let lat_hemi = hemisphere(fields.get(1), &['N', 'S'])?;
    let lng = number(fields.get(2))?;
    let lng_hemi = hemisphere(fields.get(3), &['E', 'W'])?;
    Some(Fix::gnss(
        nmea_to_degrees(lat, lat_hemi),
        nmea_to_degrees(lng, lng_hemi),
        DEFAULT_FIX_ACCURACY,
    ))
}

fn hemisphere(field: Option<&&str>, allowed: &[char]) -> Option<char> {
    let mut chars = field?.chars();
    let c = chars.next()?.to_ascii_uppercase();
    (chars.next().is_none() && allowed.contains(&c)).then_some(c)
}

/// Whether an `AT+CGNSPWR?` reply reports the GNSS engine as powered
pub fn power_reported_on(response: &str) -> bool {
    fields_after(response, CGNSPWR_TAG)
        .and_then(|f| f.first().map(|v| *v == "1"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CGNSINF_FIX: &str = "\r\n+CGNSINF: 1,1,20240101120000.000,49.274200,-123.185300,70.1,0.00,0.0,1,,1.2,1.5,0.9,,9,6,,,42,,\r\n\r\nOK\r\n";
    const CGNSINF_NO_FIX: &str = "\r\n+CGNSINF: 1,0,,,,,,,,,,,,,,,,,,,\r\n\r\nOK\r\n";
    const CGPSINFO_FIX: &str = "\r\n+CGPSINFO: 4916.45,N,12311.12,W,170124,120000.0,70.1,0.0,0.0\r\n\r\nOK\r\n";
    const CGPSINFO_NO_FIX: &str = "\r\n+CGPSINFO: ,,,,,,,,\r\n\r\nOK\r\n";

    #[test]
    fn cgnsinf_with_fix() {
        let fix = parse_cgnsinf(CGNSINF_FIX).unwrap();
        assert_eq!(fix.lat, 49.2742);
        assert_eq!(fix.lng, -123.1853);
        assert!((fix.accuracy - 6.0).abs() < 1e-9);
    }

    #[test]
    fn cgnsinf_without_fix_or_garbage() {
        assert!(parse_cgnsinf(CGNSINF_NO_FIX).is_none());
        assert!(parse_cgnsinf("\r\nERROR\r\n").is_none());
        assert!(parse_cgnsinf("").is_none());
        assert!(parse_cgnsinf("+CGNSINF: 1,1,20240101120000.000,abc,def").is_none());
    }

    #[test]
    fn cgnsinf_implausible_hdop_uses_default_accuracy() {
        let missing = "+CGNSINF: 1,1,20240101120000.000,10.5,20.25,0,0,0,1,,,1.5";
        assert_eq!(parse_cgnsinf(missing).unwrap().accuracy, DEFAULT_FIX_ACCURACY);
        let absurd = "+CGNSINF: 1,1,20240101120000.000,10.5,20.25,0,0,0,1,,999.0,1.5";
        assert_eq!(parse_cgnsinf(absurd).unwrap().accuracy, DEFAULT_FIX_ACCURACY);
        let short = "+CGNSINF: 1,1,20240101120000.000,10.5,20.25";
        assert_eq!(parse_cgnsinf(short).unwrap().accuracy, DEFAULT_FIX_ACCURACY);
    }

    #[test]
    fn cgpsinfo_with_fix() {
        let fix = parse_cgpsinfo(CGPSINFO_FIX).unwrap();
        assert!((fix.lat - 49.2742).abs() < 1e-4);
        assert!((fix.lng + 123.1853).abs() < 1e-4);
        assert_eq!(fix.accuracy, DEFAULT_FIX_ACCURACY);
    }

    #[test]
    fn cgpsinfo_without_fix() {
        assert!(parse_cgpsinfo(CGPSINFO_NO_FIX).is_none());
        assert!(parse_cgpsinfo("+CGPSINFO: 4916.45,X,12311.12,W").is_none());
        assert!(parse_cgpsinfo("OK").is_none());
    }

    #[test]
    fn power_state() {
        assert!(power_reported_on("\r\n+CGNSPWR: 1\r\n\r\nOK\r\n"));
        assert!(power_reported_on("+CGNSPWR:1"));
        assert!(!power_reported_on("\r\n+CGNSPWR: 0\r\n\r\nOK\r\n"));
        assert!(!power_reported_on("ERROR"));
    }
}
