use crate::records::Coordinates;

pub fn tel_link(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    format!("tel:{digits}")
}

/// Turn-by-turn directions to `destination` in the maps provider.
pub fn directions_link(destination: Coordinates) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&destination={},{}",
        destination.latitude, destination.longitude
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tel_link_strips_whitespace() {
        assert_eq!(tel_link("+91 98765 43210"), "tel:+919876543210");
    }

    #[test]
    fn directions_link_uses_lat_lng_order() {
        let link = directions_link(Coordinates {
            latitude: 28.6139,
            longitude: 77.209,
        });
        assert_eq!(
            link,
            "https://www.google.com/maps/dir/?api=1&destination=28.6139,77.209"
        );
    }
}
