//! Knowledge-base page use-case service.
//!
//! # Responsibility
//! - Provide page save/get/list/delete on either store kind.
//!
//! # Invariants
//! - A page keeps its UUID across saves; a save of an unknown UUID creates it.

use crate::model::user_doc::UserDocPage;
use crate::repo::user_doc_repo::UserDocRepository;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum UserDocServiceError {
    PageNotFound(Uuid),
    Repo(RepoError),
}

impl Display for UserDocServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PageNotFound(id) => write!(f, "user doc page not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for UserDocServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::PageNotFound(_) => None,
        }
    }
}

impl From<RepoError> for UserDocServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "user doc page",
                uuid,
            } => Self::PageNotFound(uuid),
            other => Self::Repo(other),
        }
    }
}

pub type UserDocServiceResult<T> = Result<T, UserDocServiceError>;

/// Knowledge-base service facade.
pub struct UserDocService<R: UserDocRepository> {
    repo: R,
}

impl<R: UserDocRepository> UserDocService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates an empty page attached to a configuration.
    pub fn create_page(
        &self,
        title: impl Into<String>,
        configuration_uuid: Option<Uuid>,
    ) -> UserDocServiceResult<UserDocPage> {
        let mut page = UserDocPage::new(title, "");
        page.configuration_uuid = configuration_uuid;
        self.save_page(&page)
    }

    /// Upserts a page and returns the stored row.
    pub fn save_page(&self, page: &UserDocPage) -> UserDocServiceResult<UserDocPage> {
        self.repo.save_page(page)?;
        self.repo
            .get_page(page.uuid)?
            .ok_or(UserDocServiceError::PageNotFound(page.uuid))
    }

    pub fn get_page(&self, uuid: Uuid) -> UserDocServiceResult<Option<UserDocPage>> {
        Ok(self.repo.get_page(uuid)?)
    }

    pub fn list_pages(&self) -> UserDocServiceResult<Vec<UserDocPage>> {
        Ok(self.repo.list_pages()?)
    }

    pub fn list_pages_by_configuration(
        &self,
        configuration_uuid: Uuid,
    ) -> UserDocServiceResult<Vec<UserDocPage>> {
        Ok(self.repo.list_pages_by_configuration(configuration_uuid)?)
    }

    /// Deletes a page and detaches every block that pointed at it.
    pub fn delete_page(&self, uuid: Uuid) -> UserDocServiceResult<()> {
        Ok(self.repo.delete_page(uuid)?)
    }
}
