use serde::{Deserialize, Serialize};

use crate::model::{api::id::ApiId, db::tag::Tag};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDescription {
    pub id: ApiId,
    pub name: String,
}

impl From<Tag> for TagDescription {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id.into(),
            name: tag.tag.name,
        }
    }
}
