//! Image-handler URLs: `{IMAGE_CDN_URL}/{base64(json request)}`.

use async_graphql::{InputObject, SimpleObject};
use base64ct::{Base64, Encoding};
use serde::Serialize;
use serde_json::json;

use super::File;

pub const MIN_THUMBNAIL_SIZE: i32 = 32;

#[derive(InputObject, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[graphql(name = "ImageResizeInput")]
pub struct ImageResize {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<String>,
    #[serde(skip)]
    pub thumbnail_size: Option<i32>,
}

#[derive(SimpleObject, Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub url: String,
    pub thumbnail: String,
}

pub fn image_url(cdn_url: &str, bucket: &str, key: &str, resize: Option<&ImageResize>) -> String {
    let mut request = json!({ "bucket": bucket, "key": key });
    if let Some(resize) = resize {
        request["edits"] = json!({ "resize": resize });
    }
    format!(
        "{}/{}",
        cdn_url.trim_end_matches('/'),
        Base64::encode_string(request.to_string().as_bytes())
    )
}

/// Full-size and square thumbnail URLs for an uploaded avatar.
pub fn avatar_picture(cdn_url: &str, file: &File, resize: Option<&ImageResize>) -> Picture {
    let size = resize
        .and_then(|r| r.thumbnail_size)
        .unwrap_or(MIN_THUMBNAIL_SIZE)
        .max(MIN_THUMBNAIL_SIZE);
    let thumbnail = ImageResize {
        width: Some(size),
        height: Some(size),
        ..Default::default()
    };
    Picture {
        url: image_url(cdn_url, &file.bucket, &file.key, resize),
        thumbnail: image_url(cdn_url, &file.bucket, &file.key, Some(&thumbnail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn decode(url: &str) -> serde_json::Value {
        let encoded = url.rsplit('/').next().unwrap();
        serde_json::from_slice(&Base64::decode_vec(encoded).unwrap()).unwrap()
    }

    fn avatar() -> File {
        let now = OffsetDateTime::now_utc();
        File {
            id: Uuid::new_v4(),
            key: "avatars/u/1.png".into(),
            bucket: "media".into(),
            name: "me.png".into(),
            mime_type: "image/png".into(),
            size: 10,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn encodes_bucket_and_key() {
        let url = image_url("https://img.example.com/", "media", "a/b.png", None);
        assert!(url.starts_with("https://img.example.com/"));
        assert_eq!(decode(&url), json!({"bucket": "media", "key": "a/b.png"}));
    }

    #[test]
    fn thumbnail_is_square_with_floor() {
        let resize = ImageResize {
            width: Some(400),
            thumbnail_size: Some(10),
            ..Default::default()
        };
        let picture = avatar_picture("https://cdn", &avatar(), Some(&resize));
        assert_eq!(
            decode(&picture.url)["edits"],
            json!({"resize": {"width": 400}})
        );
        assert_eq!(
            decode(&picture.thumbnail)["edits"],
            json!({"resize": {"width": 32, "height": 32}})
        );

        let big = ImageResize {
            thumbnail_size: Some(128),
            ..Default::default()
        };
        let picture = avatar_picture("https://cdn", &avatar(), Some(&big));
        assert_eq!(decode(&picture.thumbnail)["edits"]["resize"]["width"], 128);
    }
}
