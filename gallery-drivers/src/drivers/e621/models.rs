use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct E621TopLevel {
    pub posts: Vec<E621Post>,
}

#[derive(Deserialize, Debug)]
pub struct E621SinglePostTopLevel {
    pub post: E621Post,
}

#[derive(Deserialize, Debug)]
pub struct E621Post {
    pub id: u64,
    pub created_at: String,
    #[serde(default)]
    pub description: Option<String>,
    pub score: E621Score,
    pub tags: Tags,
    pub rating: String,
    pub uploader_id: u64,
    /// Older API responses carry a single string here.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub file: E621File,
}

#[derive(Deserialize, Debug)]
pub struct E621Score {
    #[serde(default)]
    pub up: i64,
    #[serde(default)]
    pub down: i64,
    pub total: i64,
}

#[derive(Deserialize, Debug)]
pub struct E621File {
    pub ext: Option<String>,
    pub md5: Option<String>,
    /// `null` for deleted posts and for posts hidden from anonymous users.
    pub url: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Tags {
    #[serde(default)]
    pub general: Vec<String>,
    #[serde(default)]
    pub species: Vec<String>,
    #[serde(default)]
    pub character: Vec<String>,
    #[serde(default)]
    pub copyright: Vec<String>,
    #[serde(default)]
    pub artist: Vec<String>,
    #[serde(default)]
    pub invalid: Vec<String>,
    #[serde(default)]
    pub lore: Vec<String>,
    #[serde(default)]
    pub meta: Vec<String>,
}

impl Tags {
    /// Joins every category into one space separated string. Category information is dropped.
    pub fn to_tag_string(&self) -> String {
        [
            &self.general,
            &self.species,
            &self.character,
            &self.copyright,
            &self.artist,
            &self.invalid,
            &self.lore,
            &self.meta,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
    }
}
