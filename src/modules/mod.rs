pub mod books;

use std::sync::Arc;

use bookshelf_kernel::ModuleRegistry;

use books::repository::BookRepository;

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, repository: Arc<dyn BookRepository>) {
    registry.register(books::create_module(repository));
}
