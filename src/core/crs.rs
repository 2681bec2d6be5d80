use serde::Serialize;

/// PL-2000 zones, each a 3° transverse Mercator strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ZonedCrs {
    Zone5,
    Zone6,
    Zone7,
    Zone8,
}

/// Half-open longitude bands: lower bound inclusive, upper bound exclusive.
const ZONE_BANDS: [(f64, f64, ZonedCrs); 4] = [
    (14.14, 16.5, ZonedCrs::Zone5),
    (16.5, 19.5, ZonedCrs::Zone6),
    (19.5, 22.5, ZonedCrs::Zone7),
    (22.5, 24.15, ZonedCrs::Zone8),
];

impl ZonedCrs {
    pub fn epsg(&self) -> u32 {
        match self {
            ZonedCrs::Zone5 => 2176,
            ZonedCrs::Zone6 => 2177,
            ZonedCrs::Zone7 => 2178,
            ZonedCrs::Zone8 => 2179,
        }
    }
}

/// Picks the zone for a WGS84 longitude, `None` outside 14.14°E..24.15°E.
pub fn select_crs(longitude: f64) -> Option<ZonedCrs> {
    ZONE_BANDS
        .iter()
        .find(|(low, high, _)| longitude >= *low && longitude < *high)
        .map(|(_, _, zone)| *zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_interiors() {
        assert_eq!(select_crs(15.0), Some(ZonedCrs::Zone5));
        assert_eq!(select_crs(18.0), Some(ZonedCrs::Zone6));
        assert_eq!(select_crs(21.0), Some(ZonedCrs::Zone7));
        assert_eq!(select_crs(23.0), Some(ZonedCrs::Zone8));
    }

    #[test]
    fn test_boundaries_belong_to_upper_band() {
        assert_eq!(select_crs(14.14), Some(ZonedCrs::Zone5));
        assert_eq!(select_crs(16.5), Some(ZonedCrs::Zone6));
        assert_eq!(select_crs(19.5), Some(ZonedCrs::Zone7));
        assert_eq!(select_crs(22.5), Some(ZonedCrs::Zone8));
    }

    #[test]
    fn test_outside_supported_territory() {
        assert_eq!(select_crs(14.139_999), None);
        assert_eq!(select_crs(24.15), None);
        assert_eq!(select_crs(0.0), None);
        assert_eq!(select_crs(f64::NAN), None);
    }

    #[test]
    fn test_bands_are_contiguous_and_disjoint() {
        // 每 0.001 度取樣，任一點最多只屬於一個區帶
        let mut lon = 14.14;
        while lon < 24.15 {
            let matches = ZONE_BANDS
                .iter()
                .filter(|(low, high, _)| lon >= *low && lon < *high)
                .count();
            assert_eq!(matches, 1, "longitude {}", lon);
            lon += 0.001;
        }
    }

    #[test]
    fn test_epsg_codes() {
        assert_eq!(ZonedCrs::Zone5.epsg(), 2176);
        assert_eq!(ZonedCrs::Zone6.epsg(), 2177);
        assert_eq!(ZonedCrs::Zone7.epsg(), 2178);
        assert_eq!(ZonedCrs::Zone8.epsg(), 2179);
    }
}
