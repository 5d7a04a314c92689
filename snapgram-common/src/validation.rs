//! Form schemas checked before any remote call is made.

use crate::model::{
    Id, ModelValidationError,
    auth::{Credentials, Password},
    file::FileUpload,
    post::{NewPost, Post, UpdatePost},
    user::{NewUser, UserMarker, Username},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Validate)]
pub struct SignupForm {
    #[validate(length(min = 2, message = "Your name is too short"))]
    pub name: String,
    #[validate(length(min = 2, max = 15, message = "Your username is too short"))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Minimum of 8 characters as password."))]
    pub password: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Validate)]
pub struct SigninForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Minimum of 8 characters as password."))]
    pub password: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Validate)]
pub struct PostForm {
    #[validate(length(min = 5, max = 2200))]
    pub caption: String,
    pub file: Vec<FileUpload>,
    #[validate(length(min = 2, max = 100))]
    pub location: String,
    pub tags: String,
}

impl TryFrom<SignupForm> for NewUser {
    type Error = ModelValidationError;

    fn try_from(form: SignupForm) -> Result<Self, Self::Error> {
        form.validate()?;

        Ok(Self {
            name: form.name,
            email: form.email,
            username: Username::new(form.username)?,
            password: Password::new(form.password),
        })
    }
}

impl TryFrom<SigninForm> for Credentials {
    type Error = ModelValidationError;

    fn try_from(form: SigninForm) -> Result<Self, Self::Error> {
        form.validate()?;

        Ok(Self {
            email: form.email,
            password: Password::new(form.password),
        })
    }
}

impl PostForm {
    /// Returns `Ok(None)` when the form is valid but carries no file.
    pub fn into_new_post(
        self,
        creator: Id<UserMarker>,
    ) -> Result<Option<NewPost>, ModelValidationError> {
        self.validate()?;

        let Some(file) = self.file.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(NewPost {
            creator,
            caption: self.caption,
            file,
            location: Some(self.location),
            tags: Some(self.tags),
        }))
    }

    pub fn into_update_post(self, existing: &Post) -> Result<UpdatePost, ModelValidationError> {
        self.validate()?;

        Ok(UpdatePost {
            post_id: existing.id.clone(),
            caption: self.caption,
            image_url: existing.image_url.clone(),
            image_id: existing.image_id.clone(),
            file: self.file.into_iter().next(),
            location: Some(self.location),
            tags: Some(self.tags),
        })
    }
}
