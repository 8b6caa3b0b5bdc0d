use std::{collections::BTreeMap, time::Duration};

use chrono::Utc;
use serde::Serialize;

use crate::{
    config::AppState,
    convert::{Converter, ToolReport},
    s3::StorageHealth,
};

const MONGO_PING_TIMEOUT: Duration = Duration::from_secs(5);

pub const INSTALL_RECOMMENDATIONS: [&str; 3] = [
    "Install LibreOffice: apt-get install libreoffice libreoffice-writer",
    "Install unoconv: apt-get install unoconv",
    "Install additional fonts: apt-get install fonts-noto fonts-liberation",
];

#[derive(Debug, Serialize)]
pub struct PdfStatus {
    pub platform: &'static str,
    pub pdf_conversion_tools: BTreeMap<String, ToolReport>,
    pub recommendations: Vec<&'static str>,
    pub pdf_conversion_available: bool,
}

pub async fn pdf_status(converter: &Converter) -> PdfStatus {
    let tools = converter.tool_status().await;
    let available = tools.values().any(|t| t.available);
    PdfStatus {
        platform: std::env::consts::OS,
        pdf_conversion_tools: tools,
        recommendations: if available {
            vec![]
        } else {
            INSTALL_RECOMMENDATIONS.to_vec()
        },
        pdf_conversion_available: available,
    }
}

#[derive(Debug, Serialize)]
pub struct S3Configuration {
    pub endpoint: String,
    pub bucket: String,
    pub has_credentials: bool,
}

#[derive(Debug, Serialize)]
pub struct S3Status {
    #[serde(flatten)]
    pub health: StorageHealth,
    pub configuration: S3Configuration,
}

impl S3Status {
    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }
}

pub async fn s3_status(state: &AppState) -> S3Status {
    S3Status {
        health: state.storage.health_check().await,
        configuration: S3Configuration {
            endpoint: state.storage.endpoint().to_string(),
            bucket: state.storage.bucket().to_string(),
            has_credentials: state.env_vars.has_s3_credentials(),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct MongoStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn mongo_status(state: &AppState) -> MongoStatus {
    let unhealthy = |error: String| MongoStatus {
        status: "unhealthy",
        connection: None,
        error: Some(error),
    };
    match tokio::time::timeout(MONGO_PING_TIMEOUT, schema::db::ping(&state.client)).await {
        Ok(Ok(())) => MongoStatus {
            status: "healthy",
            connection: Some("ok"),
            error: None,
        },
        Ok(Err(e)) => unhealthy(e.to_string()),
        Err(_) => unhealthy(format!(
            "no response within {}s",
            MONGO_PING_TIMEOUT.as_secs()
        )),
    }
}

#[derive(Debug, Serialize)]
pub struct Services {
    pub pdf_conversion: PdfStatus,
    pub s3_storage: S3Status,
    pub mongodb: MongoStatus,
}

#[derive(Debug, Serialize)]
pub struct SystemHealth {
    pub overall_status: &'static str,
    pub services: Services,
    pub timestamp: String,
}

impl SystemHealth {
    pub fn is_healthy(&self) -> bool {
        self.overall_status == "healthy"
    }
}

/// PDF tools, storage and database checked together.
pub async fn system_health(state: &AppState) -> SystemHealth {
    let (pdf_conversion, s3_storage, mongodb) = tokio::join!(
        pdf_status(&state.converter),
        s3_status(state),
        mongo_status(state)
    );

    let healthy = pdf_conversion.pdf_conversion_available
        && s3_storage.is_healthy()
        && mongodb.status == "healthy";

    SystemHealth {
        overall_status: if healthy { "healthy" } else { "degraded" },
        services: Services {
            pdf_conversion,
            s3_storage,
            mongodb,
        },
        timestamp: Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tools_come_with_recommendations() {
        let converter = Converter::new(
            vec![crate::convert::ConversionMethod::Unoconv(
                "/nonexistent/unoconv".to_string(),
            )],
            Duration::from_secs(1),
            0,
        );
        let status = pdf_status(&converter).await;
        assert!(!status.pdf_conversion_available);
        assert_eq!(status.recommendations.len(), 3);
        assert!(!status.pdf_conversion_tools["/nonexistent/unoconv"].available);
    }
}
