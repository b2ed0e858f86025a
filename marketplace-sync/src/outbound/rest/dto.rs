//! DTOs for decoding media API JSON responses.
//!
//! The adapter decodes into these transport DTOs first, then maps into domain
//! records in one pass. Nullable text fields collapse to empty strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Comment, Favourite, FavouriteReceipt, FileId, Listing, TaggedFile, UserId, UserProfile,
};

#[derive(Debug, Deserialize)]
pub(super) struct MediaDto {
    pub(super) file_id: u64,
    pub(super) filename: String,
    #[serde(default)]
    pub(super) title: Option<String>,
    #[serde(default)]
    pub(super) description: Option<String>,
    pub(super) user_id: u64,
    #[serde(default)]
    pub(super) media_type: Option<String>,
    #[serde(default)]
    pub(super) mime_type: Option<String>,
    pub(super) time_added: DateTime<Utc>,
    #[serde(default)]
    pub(super) thumbnails: Option<BTreeMap<String, String>>,
}

impl From<MediaDto> for Listing {
    fn from(dto: MediaDto) -> Self {
        Self {
            file_id: FileId::new(dto.file_id),
            title: dto.title.unwrap_or_default(),
            description: dto.description.unwrap_or_default(),
            user_id: UserId::new(dto.user_id),
            time_added: dto.time_added,
            thumbnails: dto.thumbnails.unwrap_or_default(),
            filename: dto.filename,
            media_type: dto.media_type,
            mime_type: dto.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CommentDto {
    pub(super) comment_id: u64,
    pub(super) file_id: u64,
    pub(super) user_id: u64,
    #[serde(default)]
    pub(super) comment: Option<String>,
    pub(super) time_added: DateTime<Utc>,
}

impl From<CommentDto> for Comment {
    fn from(dto: CommentDto) -> Self {
        Self {
            comment_id: dto.comment_id,
            file_id: FileId::new(dto.file_id),
            user_id: UserId::new(dto.user_id),
            comment: dto.comment.unwrap_or_default(),
            time_added: dto.time_added,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct FavouriteDto {
    #[serde(default)]
    pub(super) favourite_id: Option<u64>,
    pub(super) file_id: u64,
    pub(super) user_id: u64,
}

impl From<FavouriteDto> for Favourite {
    fn from(dto: FavouriteDto) -> Self {
        Self {
            favourite_id: dto.favourite_id,
            file_id: FileId::new(dto.file_id),
            user_id: UserId::new(dto.user_id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TaggedFileDto {
    pub(super) file_id: u64,
    pub(super) filename: String,
    pub(super) user_id: u64,
    pub(super) time_added: DateTime<Utc>,
    #[serde(default)]
    pub(super) tag: Option<String>,
}

impl TaggedFileDto {
    /// Map into the domain record, falling back to the requested tag when the
    /// row omits it.
    pub(super) fn into_domain(self, requested_tag: &str) -> TaggedFile {
        TaggedFile {
            file_id: FileId::new(self.file_id),
            filename: self.filename,
            user_id: UserId::new(self.user_id),
            time_added: self.time_added,
            tag: self.tag.unwrap_or_else(|| requested_tag.to_owned()),
        }
    }
}

/// Body of `GET /users/:user_id`. The email field is ignored.
#[derive(Debug, Deserialize)]
pub(super) struct UserDto {
    pub(super) user_id: u64,
    pub(super) username: String,
    #[serde(default)]
    pub(super) full_name: Option<String>,
}

impl From<UserDto> for UserProfile {
    fn from(dto: UserDto) -> Self {
        Self {
            user_id: UserId::new(dto.user_id),
            username: dto.username,
            full_name: dto.full_name.filter(|name| !name.trim().is_empty()),
        }
    }
}

/// Body of `POST /favourites`.
#[derive(Debug, Serialize)]
pub(super) struct FavouriteRequestDto {
    pub(super) file_id: u64,
}

/// Acknowledgement body of `POST /favourites`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct FavouriteReceiptDto {
    #[serde(default)]
    pub(super) favourite_id: Option<u64>,
}

impl FavouriteReceiptDto {
    pub(super) fn into_domain(self, file_id: FileId) -> FavouriteReceipt {
        FavouriteReceipt {
            favourite_id: self.favourite_id,
            file_id,
        }
    }
}

/// Error body shape: `{"message": "...", "error": "..."}`.
#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorDto {
    #[serde(default)]
    pub(super) message: Option<String>,
    #[serde(default)]
    pub(super) error: Option<String>,
}

impl ApiErrorDto {
    /// `message: error`, or whichever part is present.
    pub(super) fn summary(self) -> Option<String> {
        match (self.message, self.error) {
            (Some(message), Some(error)) => Some(format!("{message}: {error}")),
            (message, error) => message.or(error),
        }
    }
}
