//! Manuscript use-case service (book store).
//!
//! # Responsibility
//! - Provide chapter and scene operations with existence checks.
//!
//! # Invariants
//! - Scenes are only assigned to existing chapters.
//! - A chapter's content scene must exist.

use crate::model::manuscript::{Chapter, ChapterId, Scene, SceneBody, SceneId, SymbolCounts};
use crate::repo::scene_repo::ManuscriptRepository;
use crate::repo::{MoveDirection, RepoError};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum ManuscriptServiceError {
    ChapterNotFound(ChapterId),
    SceneNotFound(SceneId),
    Repo(RepoError),
}

impl Display for ManuscriptServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChapterNotFound(id) => write!(f, "chapter not found: {id}"),
            Self::SceneNotFound(id) => write!(f, "scene not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ManuscriptServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ManuscriptServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "chapter",
                uuid,
            } => Self::ChapterNotFound(uuid),
            RepoError::NotFound {
                entity: "scene",
                uuid,
            } => Self::SceneNotFound(uuid),
            other => Self::Repo(other),
        }
    }
}

pub type ManuscriptServiceResult<T> = Result<T, ManuscriptServiceError>;

/// Manuscript service facade.
pub struct ManuscriptService<R: ManuscriptRepository> {
    repo: R,
}

impl<R: ManuscriptRepository> ManuscriptService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Appends a chapter.
    pub fn create_chapter(&self, title: impl Into<String>) -> ManuscriptServiceResult<Chapter> {
        Ok(self.repo.create_chapter(&Chapter::new(title))?)
    }

    pub fn list_chapters(&self) -> ManuscriptServiceResult<Vec<Chapter>> {
        Ok(self.repo.list_chapters()?)
    }

    pub fn rename_chapter(
        &self,
        uuid: ChapterId,
        title: impl Into<String>,
    ) -> ManuscriptServiceResult<()> {
        let mut chapter = self.require_chapter(uuid)?;
        chapter.title = title.into();
        Ok(self.repo.update_chapter(&chapter)?)
    }

    /// Sets the scene holding the chapter's own text in chapter-only mode.
    pub fn set_content_scene(
        &self,
        uuid: ChapterId,
        scene_uuid: Option<SceneId>,
    ) -> ManuscriptServiceResult<()> {
        let mut chapter = self.require_chapter(uuid)?;
        if let Some(scene_uuid) = scene_uuid {
            self.require_scene(scene_uuid)?;
        }
        chapter.content_scene_uuid = scene_uuid;
        Ok(self.repo.update_chapter(&chapter)?)
    }

    /// Deletes a chapter; its scenes become chapterless.
    pub fn delete_chapter(&self, uuid: ChapterId) -> ManuscriptServiceResult<()> {
        Ok(self.repo.delete_chapter(uuid)?)
    }

    pub fn move_chapter(
        &self,
        uuid: ChapterId,
        direction: MoveDirection,
    ) -> ManuscriptServiceResult<bool> {
        Ok(self.repo.move_chapter(uuid, direction)?)
    }

    /// Creates a scene at the end of `chapter_uuid` (or of the chapterless tail).
    pub fn create_scene(
        &self,
        title: impl Into<String>,
        chapter_uuid: Option<ChapterId>,
        body: &str,
    ) -> ManuscriptServiceResult<Scene> {
        if let Some(chapter_uuid) = chapter_uuid {
            self.require_chapter(chapter_uuid)?;
        }
        Ok(self.repo.create_scene(&Scene::new(title, chapter_uuid), body)?)
    }

    pub fn get_scene(&self, uuid: SceneId) -> ManuscriptServiceResult<Option<Scene>> {
        Ok(self.repo.get_scene(uuid)?)
    }

    pub fn get_scene_with_body(
        &self,
        uuid: SceneId,
    ) -> ManuscriptServiceResult<Option<(Scene, SceneBody)>> {
        let Some(scene) = self.repo.get_scene(uuid)? else {
            return Ok(None);
        };
        let body = self.repo.get_scene_body(uuid)?.unwrap_or(SceneBody {
            scene_uuid: uuid,
            body: String::new(),
        });
        Ok(Some((scene, body)))
    }

    pub fn list_scenes(&self) -> ManuscriptServiceResult<Vec<Scene>> {
        Ok(self.repo.list_scenes()?)
    }

    pub fn list_scenes_by_chapter(
        &self,
        chapter_uuid: ChapterId,
    ) -> ManuscriptServiceResult<Vec<Scene>> {
        self.require_chapter(chapter_uuid)?;
        Ok(self.repo.list_scenes_by_chapter(chapter_uuid)?)
    }

    pub fn rename_scene(&self, uuid: SceneId, title: &str) -> ManuscriptServiceResult<()> {
        Ok(self.repo.rename_scene(uuid, title)?)
    }

    /// Replaces the scene text and returns the recomputed symbol counts.
    pub fn update_scene_body(
        &self,
        uuid: SceneId,
        body: &str,
    ) -> ManuscriptServiceResult<SymbolCounts> {
        Ok(self.repo.update_scene_body(uuid, body)?)
    }

    /// Deletes a scene with its body and instance links.
    pub fn delete_scene(&self, uuid: SceneId) -> ManuscriptServiceResult<()> {
        Ok(self.repo.delete_scene(uuid)?)
    }

    pub fn move_scene_to_chapter(
        &self,
        uuid: SceneId,
        chapter_uuid: ChapterId,
    ) -> ManuscriptServiceResult<()> {
        self.require_chapter(chapter_uuid)?;
        Ok(self.repo.move_scene_to_chapter(uuid, Some(chapter_uuid))?)
    }

    pub fn remove_scene_from_chapter(&self, uuid: SceneId) -> ManuscriptServiceResult<()> {
        Ok(self.repo.move_scene_to_chapter(uuid, None)?)
    }

    pub fn swap_scenes(&self, first: SceneId, second: SceneId) -> ManuscriptServiceResult<()> {
        Ok(self.repo.swap_scenes(first, second)?)
    }

    pub fn find_scenes_by_title(&self, query: &str) -> ManuscriptServiceResult<Vec<Scene>> {
        Ok(self.repo.find_scenes_by_title(query)?)
    }

    pub fn recalculate_scene_order(&self) -> ManuscriptServiceResult<()> {
        Ok(self.repo.recalculate_scene_order()?)
    }

    pub fn count_scenes(&self) -> ManuscriptServiceResult<i64> {
        Ok(self.repo.count_scenes()?)
    }

    fn require_chapter(&self, uuid: ChapterId) -> ManuscriptServiceResult<Chapter> {
        self.repo
            .get_chapter(uuid)?
            .ok_or(ManuscriptServiceError::ChapterNotFound(uuid))
    }

    fn require_scene(&self, uuid: SceneId) -> ManuscriptServiceResult<Scene> {
        self.repo
            .get_scene(uuid)?
            .ok_or(ManuscriptServiceError::SceneNotFound(uuid))
    }
}
