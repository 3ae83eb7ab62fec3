pub mod controls;
pub mod embeds;
pub mod player_view;
