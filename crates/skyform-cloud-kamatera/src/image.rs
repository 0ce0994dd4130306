//! `kamatera_image` data source

use crate::client::{self, ApiTransport};
use crate::dto::ImageRecord;
use crate::error::{KamateraError, Result};
use async_trait::async_trait;
use serde_json::json;
use skyform_cloud::{DataSource, ResourceData};
use std::sync::Arc;

pub const IMAGE_DATA_SOURCE: &str = "kamatera_image";

/// Public images of one datacenter
pub async fn list_images(api: &dyn ApiTransport, datacenter_id: &str) -> Result<Vec<ImageRecord>> {
    let value = client::get(
        api,
        &format!("service/server?images=1&datacenter={}", datacenter_id),
    )
    .await?;
    client::decode(value, "image list")
}

/// Image matching every non-empty criterion, if exactly one does
pub fn select_image<'a>(
    images: &'a [ImageRecord],
    id: &str,
    os: &str,
    code: &str,
) -> Option<&'a ImageRecord> {
    if id.is_empty() && os.is_empty() && code.is_empty() {
        return None;
    }

    let mut matches = images.iter().filter(|image| {
        (id.is_empty() || image.id == id)
            && (os.is_empty() || image.os == os)
            && (code.is_empty() || image.code == code)
    });

    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

pub fn image_table(images: &[ImageRecord]) -> String {
    let mut lines = vec![format!("{:<10} {:<30} {}", "os", "code", "name")];
    lines.extend(images.iter().map(|image| {
        format!(
            "{:<10} {:<30} {}",
            format!("\"{}\"", image.os),
            format!("\"{}\"", image.code),
            format!("\"{}\"", image.name)
        )
    }));
    lines.join("\n")
}

pub struct ImageDataSource {
    api: Arc<dyn ApiTransport>,
}

impl ImageDataSource {
    pub fn new(api: Arc<dyn ApiTransport>) -> Self {
        Self { api }
    }

    async fn read_image(&self, data: &mut dyn ResourceData) -> Result<()> {
        let id = data.get_string("id");
        let datacenter_id = data.get_string("datacenter_id");
        let os = data.get_string("os");
        let code = data.get_string("code");
        let private_image_name = data.get_string("private_image_name");

        // Private images are not listed by the API
        if !private_image_name.is_empty() {
            if !os.is_empty() || !code.is_empty() {
                return Err(KamateraError::InvalidConfig(
                    "when specifying private_image_name, other attributes must not be set".into(),
                ));
            }
            data.set_id(private_image_name);
            return Ok(());
        }

        let images = match list_images(self.api.as_ref(), &datacenter_id).await {
            Ok(images) => images,
            Err(e) => {
                data.set_id(String::new());
                return Err(e);
            }
        };

        match select_image(&images, &id, &os, &code) {
            Some(image) => {
                tracing::debug!("Selected image {}", image.id);
                data.set_id(image.id.clone());
                data.set("id", json!(image.id));
                data.set("os", json!(image.os));
                data.set("code", json!(image.code));
                Ok(())
            }
            None => {
                data.set_id(String::new());
                data.set("os", json!(""));
                data.set("code", json!(""));
                Err(KamateraError::InvalidConfig(format!(
                    "could not find matching image, available public images: \n{}\n\n\
                     Private images are not listed, use private_image_name to select one",
                    image_table(&images)
                )))
            }
        }
    }
}

#[async_trait]
impl DataSource for ImageDataSource {
    fn type_name(&self) -> &str {
        IMAGE_DATA_SOURCE
    }

    async fn read(&self, data: &mut dyn ResourceData) -> skyform_cloud::Result<()> {
        Ok(self.read_image(data).await?)
    }
}
