//! Selection of the `bannerpurpose` wire value from a banner record's
//! multimedia type and camera flags, ported from the bannerpurpose
//! selection switch in the appliance dispatch path.

use banner_protocol::MultimediaType;

/// Select the `bannerpurpose` literal for a new-message dispatch.
///
/// A camera message takes priority over the multimedia type whenever the
/// banner record requests the camera and names a device for it.
pub fn select_new_message_purpose(
    multimedia_type: MultimediaType,
    show_camera: bool,
    camera_device_id: Option<&str>,
) -> &'static str {
    let has_camera = show_camera && camera_device_id.is_some_and(|id| !id.trim().is_empty());
    if has_camera {
        return "newcameramessage";
    }
    match multimedia_type {
        MultimediaType::Video
        | MultimediaType::VideoStretched
        | MultimediaType::VideoZoom1
        | MultimediaType::VideoZoom2 => "newvideo",
        MultimediaType::Webpage | MultimediaType::WebMedia => "newwebpage",
        MultimediaType::LocationsDisplay => "newlocationsdisplay",
        MultimediaType::GeoLocationsMap => "newgeolocationsmap",
        MultimediaType::None | MultimediaType::Message | MultimediaType::MessageFullScreen => {
            "newscrollingmessage"
        }
    }
}

/// Resolve the `webpageurl` field: a concrete URL for webpage/webmedia, a
/// filename for video, the resolved RTSP stream URL for camera messages,
/// and the literal `"FALSE"` otherwise.
pub fn resolve_webpage_url(
    multimedia_type: MultimediaType,
    show_camera: bool,
    camera_device_id: Option<&str>,
    camera_stream_url: Option<&str>,
    webpage_or_video: Option<&str>,
) -> String {
    let has_camera = show_camera && camera_device_id.is_some_and(|id| !id.trim().is_empty());
    if has_camera {
        return camera_stream_url.unwrap_or("FALSE").to_string();
    }
    match multimedia_type {
        MultimediaType::Video
        | MultimediaType::VideoStretched
        | MultimediaType::VideoZoom1
        | MultimediaType::VideoZoom2
        | MultimediaType::Webpage
        | MultimediaType::WebMedia => webpage_or_video.unwrap_or("FALSE").to_string(),
        _ => "FALSE".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_takes_priority_over_multimedia_type() {
        let purpose = select_new_message_purpose(MultimediaType::Video, true, Some("cam-1"));
        assert_eq!(purpose, "newcameramessage");
    }

    #[test]
    fn blank_camera_device_id_falls_back_to_multimedia_type() {
        let purpose = select_new_message_purpose(MultimediaType::Webpage, true, Some("   "));
        assert_eq!(purpose, "newwebpage");
    }

    #[test]
    fn plain_message_selects_scrolling_message() {
        let purpose = select_new_message_purpose(MultimediaType::None, false, None);
        assert_eq!(purpose, "newscrollingmessage");
    }

    #[test]
    fn geolocations_map_selects_its_own_purpose() {
        let purpose = select_new_message_purpose(MultimediaType::GeoLocationsMap, false, None);
        assert_eq!(purpose, "newgeolocationsmap");
    }

    #[test]
    fn webpage_url_falls_back_to_false() {
        let url = resolve_webpage_url(MultimediaType::None, false, None, None, None);
        assert_eq!(url, "FALSE");
    }

    #[test]
    fn camera_url_prefers_resolved_stream() {
        let url = resolve_webpage_url(
            MultimediaType::Video,
            true,
            Some("cam-1"),
            Some("rtsp://cam-1/stream"),
            Some("fallback.mp4"),
        );
        assert_eq!(url, "rtsp://cam-1/stream");
    }
}
