use propmedia_core::models::ListingStatus;
use propmedia_core::{AppError, AppResult};

use super::types::{OwnerApprovalInput, OwnerApprovalOutput};
use super::{ensure_listing_id, ensure_requested_by, load_listing, LedgerResultExt, MediaProcessingService};

impl MediaProcessingService {
    /// Owner decision on finalized media. Approval moves the listing on to
    /// admin review (or straight to ready); rejection sends it back for new
    /// uploads.
    #[tracing::instrument(skip(self, input), fields(listing_identity_id = input.listing_identity_id, approve = input.approve))]
    pub async fn handle_owner_media_approval(
        &self,
        input: OwnerApprovalInput,
    ) -> AppResult<OwnerApprovalOutput> {
        ensure_requested_by(input.requested_by)?;
        ensure_listing_id(input.listing_identity_id)?;

        let mut tx = self.begin().await?;
        let listing = load_listing(&mut tx, input.listing_identity_id).await?;
        if listing.status != ListingStatus::PendingOwnerApproval {
            return Err(AppError::validation("listing is not awaiting owner approval")
                .with_detail("status", listing.status.as_str()));
        }
        if listing.owner_id != input.requested_by {
            return Err(AppError::forbidden(
                "only the listing owner can approve or reject media",
            ));
        }

        let new_status = match (input.approve, self.config.require_admin_review) {
            (true, true) => ListingStatus::PendingAdminReview,
            (true, false) => ListingStatus::Ready,
            (false, _) => ListingStatus::RejectedByOwner,
        };
        tx.update_listing_status(input.listing_identity_id, &new_status)
            .await
            .or_infra("failed to update listing status")?;
        self.commit(tx, "failed to commit owner approval").await?;

        tracing::info!(
            listing_identity_id = input.listing_identity_id,
            new_status = %new_status,
            "Owner media decision recorded"
        );

        Ok(OwnerApprovalOutput {
            listing_identity_id: input.listing_identity_id,
            new_status,
        })
    }
}
