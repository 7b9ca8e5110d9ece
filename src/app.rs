//! A window and event loop around a [`Renderer`].

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::{
    config::RendererConfig,
    error::{Error, Result},
    pass::Scene,
    renderer::Renderer,
};

struct App<S: Scene> {
    config: RendererConfig,
    scene: Option<S>,
    // Dropped before the window it renders to.
    renderer: Option<Renderer<S>>,
    window: Option<Window>,
    error: Option<Error>,
}

impl<S: Scene> App<S> {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        log::error!("{}", error);
        self.error = Some(error);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop, scene: S) -> Result<()> {
        let (width, height) = self.config.window_size;
        let attributes = Window::default_attributes()
            .with_title(self.config.app_name.clone())
            .with_inner_size(PhysicalSize::new(width, height));

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::Window(e.to_string()))?;

        let display = window
            .display_handle()
            .map_err(|e| Error::Window(e.to_string()))?
            .as_raw();
        let handle = window
            .window_handle()
            .map_err(|e| Error::Window(e.to_string()))?
            .as_raw();
        let size = window.inner_size();

        // Safety: the window is stored next to the renderer and dropped
        // after it.
        let renderer = unsafe {
            Renderer::new(
                self.config.clone(),
                display,
                handle,
                (size.width, size.height),
                scene,
            )?
        };

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }
}

impl<S: Scene> ApplicationHandler for App<S> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(scene) = self.scene.take() else {
            return;
        };

        if let Err(e) = self.start(event_loop, scene) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => renderer.notify_resized(size.width, size.height),

            WindowEvent::RedrawRequested => {
                if let Err(e) = renderer.draw_frame() {
                    self.fail(event_loop, e);
                }
            }

            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.destroy();
        }
    }
}

/// Opens a window and renders `scene` into it until the window is closed.
pub fn run<S: Scene>(config: RendererConfig, scene: S) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        config,
        scene: Some(scene),
        renderer: None,
        window: None,
        error: None,
    };

    event_loop
        .run_app(&mut app)
        .map_err(|e| Error::Window(e.to_string()))?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
