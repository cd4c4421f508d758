pub(crate) mod download;
pub(crate) mod info;
pub(crate) mod library;
pub(crate) mod media;
pub(crate) mod playlists;
pub(crate) mod status;
