//! The slice of the listing catalog the media core reads and advances.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    PendingPhotoProcessing,
    RejectedByOwner,
    PendingPlanLoading,
    PendingOwnerApproval,
    PendingAdminReview,
    Ready,
    /// Catalog status the media core does not act on.
    Other(String),
}

impl ListingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ListingStatus::PendingPhotoProcessing => "PENDING_PHOTO_PROCESSING",
            ListingStatus::RejectedByOwner => "REJECTED_BY_OWNER",
            ListingStatus::PendingPlanLoading => "PENDING_PLAN_LOADING",
            ListingStatus::PendingOwnerApproval => "PENDING_OWNER_APPROVAL",
            ListingStatus::PendingAdminReview => "PENDING_ADMIN_REVIEW",
            ListingStatus::Ready => "READY",
            ListingStatus::Other(s) => s,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PENDING_PHOTO_PROCESSING" => ListingStatus::PendingPhotoProcessing,
            "REJECTED_BY_OWNER" => ListingStatus::RejectedByOwner,
            "PENDING_PLAN_LOADING" => ListingStatus::PendingPlanLoading,
            "PENDING_OWNER_APPROVAL" => ListingStatus::PendingOwnerApproval,
            "PENDING_ADMIN_REVIEW" => ListingStatus::PendingAdminReview,
            "READY" => ListingStatus::Ready,
            other => ListingStatus::Other(other.to_string()),
        }
    }

    /// Statuses in which photo/video uploads and processing are accepted.
    pub fn accepts_media_uploads(&self) -> bool {
        matches!(
            self,
            ListingStatus::PendingPhotoProcessing | ListingStatus::RejectedByOwner
        )
    }
}

impl Display for ListingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ListingStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ListingStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ListingStatus::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "OFF_PLAN_HOUSE")]
    OffPlanHouse,
    #[serde(untagged)]
    Other(String),
}

impl PropertyType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "OFF_PLAN_HOUSE" => PropertyType::OffPlanHouse,
            other => PropertyType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PropertyType::OffPlanHouse => "OFF_PLAN_HOUSE",
            PropertyType::Other(s) => s,
        }
    }
}

/// Active version of a listing, as seen by the media core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSnapshot {
    pub identity_id: i64,
    pub version_id: i64,
    pub owner_id: i64,
    pub status: ListingStatus,
    pub property_type: PropertyType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_status_parse() {
        assert_eq!(
            ListingStatus::parse("pending_photo_processing"),
            ListingStatus::PendingPhotoProcessing
        );
        assert_eq!(
            ListingStatus::parse("PUBLISHED"),
            ListingStatus::Other("PUBLISHED".to_string())
        );
        assert!(ListingStatus::RejectedByOwner.accepts_media_uploads());
        assert!(!ListingStatus::Ready.accepts_media_uploads());
    }

    #[test]
    fn test_property_type_parse() {
        assert_eq!(PropertyType::parse("off_plan_house"), PropertyType::OffPlanHouse);
        assert_eq!(PropertyType::parse("APARTMENT").as_str(), "APARTMENT");
    }
}
