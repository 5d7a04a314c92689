//! Reads bound to cached queries, writes bound to invalidating mutations.

use crate::{
    cache::QueryCache,
    error::Result,
    infinite::InfinitePages,
    invalidation::Mutation,
    keys::QueryKey,
};
use snapgram_appwrite::{Api, AppwriteError, Backend};
use snapgram_common::model::{
    Id, Page,
    auth::{Credentials, Session},
    file::FileMarker,
    post::{NewPost, Post, PostMarker, UpdatePost},
    save::{SaveMarker, SavedPost},
    user::{NewUser, UpdateUser, User, UserMarker},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct QueryClient<B> {
    api: Api<B>,
    cache: QueryCache,
    /// Serializes loads of the paginated post list.
    pages: Mutex<()>,
}

impl<B: Backend> QueryClient<B> {
    pub fn new(api: Api<B>, cache: QueryCache) -> Self {
        Self {
            api,
            cache,
            pages: Mutex::new(()),
        }
    }

    pub fn api(&self) -> &Api<B> {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Invalidates what `mutation` made stale, once it succeeded.
    fn settle<T>(&self, mutation: &Mutation, result: Result<T, AppwriteError>) -> Result<T> {
        let value = result?;
        let marked = self.cache.invalidate(&mutation.invalidates());
        debug!(?mutation, marked, "Mutation succeeded");
        Ok(value)
    }

    pub async fn current_user(&self) -> Result<Arc<User>> {
        self.cache
            .fetch(QueryKey::CurrentUser, self.api.get_current_user())
            .await
    }

    pub async fn recent_posts(&self) -> Result<Arc<Page<Post>>> {
        self.cache
            .fetch(QueryKey::RecentPosts, self.api.get_recent_posts())
            .await
    }

    /// Idle (`None`) while `post_id` is empty.
    pub async fn post_by_id(&self, post_id: &Id<PostMarker>) -> Result<Option<Arc<Post>>> {
        if post_id.is_empty() {
            return Ok(None);
        }

        self.cache
            .fetch(
                QueryKey::PostById(post_id.clone()),
                self.api.get_post_by_id(post_id),
            )
            .await
            .map(Some)
    }

    async fn fetch_posts_page(&self, cursor: Option<String>) -> Result<Page<Post>, AppwriteError> {
        let cursor = cursor.map(Id::<PostMarker>::new);
        self.api.get_infinite_posts(cursor.as_ref()).await
    }

    /// Loads the post list, reloading as many pages as were loaded before
    /// when it went stale.
    async fn load_posts(&self) -> Result<Arc<InfinitePages<Post>>> {
        let page_count = self
            .cache
            .get_data::<InfinitePages<Post>>(&QueryKey::InfinitePosts)
            .await
            .map_or(1, |pages| pages.page_count());

        self.cache
            .fetch(
                QueryKey::InfinitePosts,
                InfinitePages::load(page_count, move |cursor| self.fetch_posts_page(cursor)),
            )
            .await
    }

    /// The paginated post list, most recently updated first.
    pub async fn posts(&self) -> Result<Arc<InfinitePages<Post>>> {
        let _guard = self.pages.lock().await;
        self.load_posts().await
    }

    /// Appends the page after the last loaded post. Does nothing once an
    /// empty page was loaded.
    pub async fn fetch_next_posts_page(&self) -> Result<Arc<InfinitePages<Post>>> {
        let _guard = self.pages.lock().await;
        let current = self.load_posts().await?;
        if !current.has_next_page() {
            debug!(pages = current.page_count(), "No more posts");
            return Ok(current);
        }

        let cursor = current.next_cursor().map(str::to_owned);
        self.cache
            .update(QueryKey::InfinitePosts, async {
                let page = self.fetch_posts_page(cursor.clone()).await?;
                let mut next = InfinitePages::clone(&current);
                next.push(cursor, page);
                Ok::<_, AppwriteError>(next)
            })
            .await
    }

    /// Idle (`None`) while `search_term` is empty.
    pub async fn search_posts(&self, search_term: &str) -> Result<Option<Arc<Page<Post>>>> {
        if search_term.is_empty() {
            return Ok(None);
        }

        self.cache
            .fetch(
                QueryKey::SearchPosts(search_term.to_owned()),
                self.api.search_posts(search_term),
            )
            .await
            .map(Some)
    }

    pub async fn users(&self, limit: Option<u32>) -> Result<Arc<Page<User>>> {
        self.cache
            .fetch(QueryKey::Users(limit), self.api.get_users(limit))
            .await
    }

    /// Idle (`None`) while `user_id` is empty.
    pub async fn user_by_id(&self, user_id: &Id<UserMarker>) -> Result<Option<Arc<User>>> {
        if user_id.is_empty() {
            return Ok(None);
        }

        self.cache
            .fetch(
                QueryKey::UserById(user_id.clone()),
                self.api.get_user_by_id(user_id),
            )
            .await
            .map(Some)
    }

    pub async fn create_user_account(&self, user: &NewUser) -> Result<User> {
        let result = self.api.create_user_account(user).await;
        self.settle(&Mutation::CreateUserAccount, result)
    }

    pub async fn sign_in_account(&self, credentials: &Credentials) -> Result<Session> {
        let result = self.api.sign_in_account(credentials).await;
        self.settle(&Mutation::SignIn, result)
    }

    pub async fn sign_out_account(&self) -> Result<()> {
        let result = self.api.sign_out_account().await;
        self.settle(&Mutation::SignOut, result)
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let result = self.api.create_post(post).await;
        self.settle(&Mutation::CreatePost, result)
    }

    pub async fn like_post(
        &self,
        post_id: &Id<PostMarker>,
        likes: &[Id<UserMarker>],
    ) -> Result<Post> {
        let result = self.api.like_post(post_id, likes).await;
        self.settle(&Mutation::LikePost(post_id.clone()), result)
    }

    /// Likes `post` as `user_id`, or takes the like back.
    pub async fn toggle_like(&self, post: &Post, user_id: &Id<UserMarker>) -> Result<Post> {
        self.like_post(&post.id, &post.likes_toggled(user_id)).await
    }

    pub async fn save_post(
        &self,
        user_id: &Id<UserMarker>,
        post_id: &Id<PostMarker>,
    ) -> Result<SavedPost> {
        let result = self.api.save_post(user_id, post_id).await;
        self.settle(&Mutation::SavePost(post_id.clone()), result)
    }

    pub async fn delete_saved_post(&self, saved_record_id: &Id<SaveMarker>) -> Result<()> {
        let result = self.api.delete_saved_post(saved_record_id).await;
        self.settle(&Mutation::DeleteSavedPost(saved_record_id.clone()), result)
    }

    /// Saves `post_id` for `user`, or removes the existing save record.
    /// Returns the new record when one was created.
    pub async fn toggle_save(
        &self,
        user: &User,
        post_id: &Id<PostMarker>,
    ) -> Result<Option<SavedPost>> {
        match user.saved_record_for(post_id) {
            Some(saved) => {
                self.delete_saved_post(&saved.id).await?;
                Ok(None)
            }
            None => self.save_post(&user.id, post_id).await.map(Some),
        }
    }

    pub async fn update_post(&self, post: &UpdatePost) -> Result<Post> {
        let result = self.api.update_post(post).await;
        self.settle(&Mutation::UpdatePost(post.post_id.clone()), result)
    }

    pub async fn delete_post(
        &self,
        post_id: &Id<PostMarker>,
        image_id: &Id<FileMarker>,
    ) -> Result<()> {
        let result = self.api.delete_post(post_id, image_id).await;
        self.settle(&Mutation::DeletePost(post_id.clone()), result)
    }

    pub async fn update_user(&self, user: &UpdateUser) -> Result<User> {
        let result = self.api.update_user(user).await;
        self.settle(&Mutation::UpdateUser(user.user_id.clone()), result)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cache::{CacheConfig, QueryCache},
        client::QueryClient,
        keys::QueryKey,
    };
    use serde_json::json;
    use snapgram_appwrite::{
        Api,
        mock::{Call, MockBackend, Operation},
    };
    use snapgram_common::model::{Id, user::UserMarker};

    fn client() -> QueryClient<MockBackend> {
        QueryClient::new(
            Api::new(MockBackend::new(), MockBackend::resources()),
            QueryCache::new(&CacheConfig::default()),
        )
    }

    fn backend(client: &QueryClient<MockBackend>) -> &MockBackend {
        client.api().backend()
    }

    fn seed_post(client: &QueryClient<MockBackend>, id: &str, likes: &[&str]) {
        backend(client).insert_file(&format!("f-{id}"));
        backend(client).insert_document(
            "posts",
            id,
            json!({
                "creator": "u1",
                "caption": format!("caption of {id}"),
                "imageUrl": format!("https://appwrite.test/v1/storage/buckets/media/files/f-{id}/preview"),
                "imageId": format!("f-{id}"),
                "tags": ["sun"],
                "likes": likes,
            }),
        );
    }

    fn seed_current_user(client: &QueryClient<MockBackend>) {
        backend(client).sign_in_as("acc1", "ada@example.com");
        backend(client).insert_document(
            "users",
            "u1",
            json!({
                "accountId": "acc1",
                "name": "Ada",
                "email": "ada@example.com",
                "username": "ada",
                "imageUrl": "https://appwrite.test/v1/avatars/initials?name=Ada",
            }),
        );
    }

    fn list_calls(client: &QueryClient<MockBackend>) -> usize {
        backend(client).count_calls(|call| matches!(call, Call::ListDocuments { .. }))
    }

    #[tokio::test]
    async fn like_marks_dependent_queries_stale() {
        let client = client();
        seed_current_user(&client);
        seed_post(&client, "p1", &[]);
        seed_post(&client, "p2", &[]);

        client.current_user().await.unwrap();
        client.recent_posts().await.unwrap();
        client.posts().await.unwrap();
        client.post_by_id(&Id::new("p1")).await.unwrap();
        client.post_by_id(&Id::new("p2")).await.unwrap();
        client.users(None).await.unwrap();
        backend(&client).clear_calls();

        let likes: [Id<UserMarker>; 2] = [Id::new("u1"), Id::new("u2")];
        let post = client.like_post(&Id::new("p1"), &likes).await.unwrap();

        assert_eq!(post.likes, likes);
        assert_eq!(
            backend(&client).calls(),
            vec![Call::UpdateDocument {
                collection_id: "posts".to_owned(),
                document_id: "p1".to_owned(),
                data: json!({ "likes": ["u1", "u2"] }),
            }]
        );

        let cache = client.cache();
        assert!(cache.is_stale(&QueryKey::PostById(Id::new("p1"))).await);
        assert!(cache.is_stale(&QueryKey::RecentPosts).await);
        assert!(cache.is_stale(&QueryKey::InfinitePosts).await);
        assert!(cache.is_stale(&QueryKey::CurrentUser).await);
        assert!(!cache.is_stale(&QueryKey::PostById(Id::new("p2"))).await);
        assert!(!cache.is_stale(&QueryKey::Users(None)).await);

        let reread = client.post_by_id(&Id::new("p1")).await.unwrap().unwrap();
        assert_eq!(reread.likes, likes);
        assert_eq!(
            backend(&client).count_calls(|call| matches!(call, Call::GetDocument { .. })),
            1
        );
    }

    #[tokio::test]
    async fn failed_mutation_invalidates_nothing() {
        let client = client();
        seed_post(&client, "p1", &[]);
        client.post_by_id(&Id::new("p1")).await.unwrap();
        backend(&client).fail(Operation::UpdateDocument);

        assert!(client.like_post(&Id::new("p1"), &[Id::new("u1")]).await.is_err());
        assert!(!client.cache().is_stale(&QueryKey::PostById(Id::new("p1"))).await);
    }

    #[tokio::test]
    async fn cached_reads_hit_backend_once() {
        let client = client();
        seed_post(&client, "p1", &[]);

        let (a, b, c) = tokio::join!(
            client.recent_posts(),
            client.recent_posts(),
            client.recent_posts()
        );
        assert_eq!(a.unwrap().items.len(), 1);
        assert!(b.is_ok() && c.is_ok());
        client.recent_posts().await.unwrap();

        assert_eq!(list_calls(&client), 1);
    }

    #[tokio::test]
    async fn empty_parameters_keep_queries_idle() {
        let client = client();

        assert!(client.post_by_id(&Id::default()).await.unwrap().is_none());
        assert!(client.user_by_id(&Id::default()).await.unwrap().is_none());
        assert!(client.search_posts("").await.unwrap().is_none());
        assert!(backend(&client).calls().is_empty());
    }

    #[tokio::test]
    async fn searches_are_cached_per_term() {
        let client = client();
        seed_post(&client, "p1", &[]);
        seed_post(&client, "p2", &[]);

        let found = client.search_posts("p1").await.unwrap().unwrap();
        assert_eq!(found.items.len(), 1);
        client.search_posts("p1").await.unwrap();
        client.search_posts("p2").await.unwrap();

        assert_eq!(list_calls(&client), 2);
    }

    #[tokio::test]
    async fn post_pages_load_until_empty() {
        let client = client();
        for index in 0..45 {
            seed_post(&client, &format!("p{index:02}"), &[]);
        }

        let pages = client.posts().await.unwrap();
        assert_eq!(pages.page_count(), 1);
        assert_eq!(pages.items().count(), 20);
        assert_eq!(pages.next_cursor(), Some("p25"));

        client.fetch_next_posts_page().await.unwrap();
        let pages = client.fetch_next_posts_page().await.unwrap();
        assert_eq!(pages.page_count(), 3);
        assert_eq!(pages.items().count(), 45);

        let pages = client.fetch_next_posts_page().await.unwrap();
        assert_eq!(pages.page_count(), 4);
        assert!(!pages.has_next_page());
        assert_eq!(list_calls(&client), 4);

        let pages = client.fetch_next_posts_page().await.unwrap();
        assert_eq!(pages.page_count(), 4);
        assert_eq!(list_calls(&client), 4);
    }

    #[tokio::test]
    async fn stale_post_pages_reload_same_depth() {
        let client = client();
        for index in 0..25 {
            seed_post(&client, &format!("p{index:02}"), &[]);
        }
        client.posts().await.unwrap();
        client.fetch_next_posts_page().await.unwrap();
        backend(&client).clear_calls();

        client.like_post(&Id::new("p00"), &[Id::new("u1")]).await.unwrap();
        let pages = client.posts().await.unwrap();

        assert_eq!(list_calls(&client), 2);
        assert_eq!(pages.page_count(), 2);
        assert_eq!(pages.items().next().unwrap().id, Id::new("p00"));
        assert_eq!(pages.items().count(), 25);
    }

    #[tokio::test]
    async fn toggles() {
        let client = client();
        seed_current_user(&client);
        seed_post(&client, "p1", &["u1", "u2"]);

        let post = client.post_by_id(&Id::new("p1")).await.unwrap().unwrap();
        let user_id = Id::new("u1");
        let unliked = client.toggle_like(&post, &user_id).await.unwrap();
        assert_eq!(unliked.likes, [Id::new("u2")]);
        let liked = client.toggle_like(&unliked, &user_id).await.unwrap();
        assert!(liked.is_liked_by(&user_id));

        let user = client.current_user().await.unwrap();
        let saved = client
            .toggle_save(&user, &Id::new("p1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backend(&client).documents("saves").len(), 1);

        let mut user = (*user).clone();
        user.saves.push(saved);
        assert!(client.toggle_save(&user, &Id::new("p1")).await.unwrap().is_none());
        assert!(backend(&client).documents("saves").is_empty());
    }

    #[tokio::test]
    async fn sign_out_refreshes_current_user() {
        let client = client();
        seed_current_user(&client);

        client.current_user().await.unwrap();
        client.sign_out_account().await.unwrap();

        assert!(client.cache().is_stale(&QueryKey::CurrentUser).await);
        let error = client.current_user().await.unwrap_err();
        assert!(error.remote().is_some());
    }

    #[tokio::test]
    async fn delete_post_refreshes_lists() {
        let client = client();
        seed_post(&client, "p1", &[]);
        seed_post(&client, "p2", &[]);
        assert_eq!(client.recent_posts().await.unwrap().items.len(), 2);

        client
            .delete_post(&Id::new("p1"), &Id::new("f-p1"))
            .await
            .unwrap();

        assert_eq!(client.recent_posts().await.unwrap().items.len(), 1);
        assert!(
            client
                .post_by_id(&Id::new("p1"))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }
}
