mod layout;
mod reference;
mod repository;
