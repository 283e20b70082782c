// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Bounded queue of frames delivered by an external producer.
//!
//! An [`ImageReceiver`] is armed by asking for its surface id, which a
//! producer (typically a camera capture loop) uses to obtain a
//! [`ProducerSurface`] and push frames into it. The receiver never holds
//! more than `capacity` outstanding images: a frame counts against the
//! capacity from the moment it is queued until the [`Image`] read from it is
//! released or dropped. Frames offered beyond that are refused with
//! [`Error::QueueFull`].
//!
//! ```text
//! Idle --surface id--> Armed --arrival--> Receiving --read--> Draining
//!   \                    \                    ^                  |
//!    \                    \                   `--images released-'
//!     `-------------------`--------- release or last handle dropped --> Released
//! ```

use crate::{
    completion::Completion,
    convert,
    decoder::{self, DecodeOptions},
    error::{Error, Result},
    format::{ComponentType, ImageFormat, PixelFormat, Region, Size},
    pixel_map::PixelMap,
};
use core::fmt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    pin::pin,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

static SURFACES: Lazy<Mutex<HashMap<String, Weak<Shared>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);

/// Events a receiver reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReceiverEvent {
    /// A frame was queued.
    ImageArrival,
}

impl FromStr for ReceiverEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "imageArrival" => Ok(ReceiverEvent::ImageArrival),
            other => Err(Error::InvalidArgument(format!("unknown receiver event {other:?}"))),
        }
    }
}

/// Lifecycle of a receiver queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    /// The surface is registered and waiting for frames.
    Armed,
    Receiving,
    /// Images handed out by a read are still held by the consumer.
    Draining,
    Released,
}

type ArrivalCallback = Arc<dyn Fn() + Send + Sync>;

struct Frame {
    data: Vec<u8>,
    timestamp: i64,
}

struct Queue {
    state: ReceiverState,
    pending: VecDeque<Frame>,
    /// Queued frames plus images handed out and not yet released.
    outstanding: usize,
    surface_id: Option<String>,
    on_arrival: Option<ArrivalCallback>,
}

impl Queue {
    fn transition(&mut self, next: ReceiverState) {
        if self.state != next {
            trace!("receiver {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

struct Shared {
    size: Size,
    format: ImageFormat,
    capacity: usize,
    queue: Mutex<Queue>,
    arrivals: Notify,
}

impl Shared {
    fn return_slot(&self) {
        let mut queue = self.queue.lock();
        queue.outstanding = queue.outstanding.saturating_sub(1);
        trace!("slot returned, {} outstanding", queue.outstanding);
        if queue.state == ReceiverState::Draining && queue.outstanding == queue.pending.len() {
            queue.transition(ReceiverState::Receiving);
        }
    }

    fn take(self: &Arc<Self>, latest: bool) -> Result<Image> {
        let mut queue = self.queue.lock();
        if queue.state == ReceiverState::Released {
            return Err(Error::AlreadyReleased);
        }
        let frame = if latest {
            let newest = queue.pending.pop_back();
            let skipped = queue.pending.len();
            if skipped > 0 {
                queue.pending.clear();
                queue.outstanding -= skipped;
                trace!("released {skipped} older frames");
            }
            newest
        } else {
            queue.pending.pop_front()
        };
        let frame = frame.ok_or(Error::QueueEmpty)?;
        queue.transition(ReceiverState::Draining);
        drop(queue);

        Ok(Image::new(self.clone(), frame))
    }

    async fn wait_for(self: Arc<Self>, latest: bool) -> Result<Image> {
        loop {
            // enabled before checking the queue so an arrival in between
            // still wakes this reader
            let mut notified = pin!(self.arrivals.notified());
            notified.as_mut().enable();
            match self.take(latest) {
                Err(Error::QueueEmpty) => notified.await,
                other => return other,
            }
        }
    }

    /// Drops queued frames, unregisters the surface and wakes pending reads.
    fn close(&self) -> Result<()> {
        let mut queue = self.queue.lock();
        if queue.state == ReceiverState::Released {
            return Err(Error::AlreadyReleased);
        }
        let dropped = queue.pending.len();
        queue.pending.clear();
        queue.outstanding -= dropped;
        queue.on_arrival = None;
        queue.transition(ReceiverState::Released);
        let surface = queue.surface_id.take();
        drop(queue);

        if let Some(id) = surface {
            SURFACES.lock().remove(&id);
            debug!("receiver surface {id} unregistered, {dropped} frames dropped");
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    fn check_frame(&self, data: &[u8]) -> Result<()> {
        match self.format {
            ImageFormat::YCbCr422Sp => {
                let expected = self.size.width as usize * self.size.height as usize * 2;
                if data.len() != expected {
                    return Err(Error::InvalidArgument(format!(
                        "{} frame of {} is {expected} bytes, got {}",
                        self.format,
                        self.size,
                        data.len()
                    )));
                }
            }
            ImageFormat::Jpeg => {
                if data.is_empty() {
                    return Err(Error::InvalidArgument("empty JPEG frame".into()));
                }
            }
        }
        Ok(())
    }
}

/// Held only by [`ImageReceiver`] handles. Images and pending reads keep
/// the queue alive but not the surface registration.
struct Owner(Arc<Shared>);

impl Drop for Owner {
    fn drop(&mut self) {
        if self.0.close().is_ok() {
            debug!("receiver dropped without release");
        }
    }
}

/// Consumer side of a frame queue.
///
/// Clones share the same queue. Dropping the last clone releases it.
#[derive(Clone)]
pub struct ImageReceiver {
    shared: Arc<Shared>,
    _owner: Arc<Owner>,
}

impl ImageReceiver {
    /// Creates an idle receiver for `size` frames of `format`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty size, a zero capacity or an
    /// odd width with [`ImageFormat::YCbCr422Sp`].
    pub fn new(size: Size, format: ImageFormat, capacity: usize) -> Result<Self> {
        if size.is_empty() {
            return Err(Error::InvalidArgument(format!("invalid receiver size {size}")));
        }
        if capacity == 0 {
            return Err(Error::InvalidArgument("receiver capacity must be at least 1".into()));
        }
        if format == ImageFormat::YCbCr422Sp && size.width % 2 != 0 {
            return Err(Error::InvalidArgument(format!(
                "{format} needs an even width, got {size}"
            )));
        }
        debug!("image receiver {size} {format} capacity {capacity}");
        let shared = Arc::new(Shared {
            size,
            format,
            capacity,
            queue: Mutex::new(Queue {
                state: ReceiverState::Idle,
                pending: VecDeque::with_capacity(capacity),
                outstanding: 0,
                surface_id: None,
                on_arrival: None,
            }),
            arrivals: Notify::new(),
        });
        Ok(ImageReceiver {
            _owner: Arc::new(Owner(shared.clone())),
            shared,
        })
    }

    pub fn size(&self) -> Size {
        self.shared.size
    }

    pub fn format(&self) -> ImageFormat {
        self.shared.format
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn state(&self) -> ReceiverState {
        self.shared.queue.lock().state
    }

    /// Number of images counting against the capacity.
    pub fn outstanding(&self) -> usize {
        self.shared.queue.lock().outstanding
    }

    /// Registers the receiving surface on first call and returns its id,
    /// which [`ProducerSurface::lookup`] resolves.
    pub fn receiving_surface_id(&self) -> Result<String> {
        let mut queue = self.shared.queue.lock();
        if queue.state == ReceiverState::Released {
            return Err(Error::AlreadyReleased);
        }
        if let Some(id) = &queue.surface_id {
            return Ok(id.clone());
        }
        let id = NEXT_SURFACE.fetch_add(1, Ordering::Relaxed).to_string();
        SURFACES
            .lock()
            .insert(id.clone(), Arc::downgrade(&self.shared));
        queue.surface_id = Some(id.clone());
        queue.transition(ReceiverState::Armed);
        debug!("receiver surface {id} registered");
        Ok(id)
    }

    /// Installs the arrival handler, replacing any previous one. The handler
    /// runs on the producer's thread after the frame is queued.
    pub fn on<F>(&self, event: ReceiverEvent, callback: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.state == ReceiverState::Released {
            return Err(Error::AlreadyReleased);
        }
        match event {
            ReceiverEvent::ImageArrival => queue.on_arrival = Some(Arc::new(callback)),
        }
        Ok(())
    }

    /// Takes the oldest queued image, or fails with [`Error::QueueEmpty`].
    pub fn try_read_next_image(&self) -> Result<Image> {
        self.shared.take(false)
    }

    /// Takes the newest queued image and releases every older one, or fails
    /// with [`Error::QueueEmpty`].
    pub fn try_read_latest_image(&self) -> Result<Image> {
        self.shared.take(true)
    }

    /// Resolves with the oldest image, waiting for an arrival if the queue
    /// is empty.
    pub fn read_next_image(&self) -> Completion<Image> {
        Completion::spawn(self.shared.clone().wait_for(false))
    }

    /// Resolves with the newest image, waiting for an arrival if the queue
    /// is empty. Older unread images are released.
    pub fn read_latest_image(&self) -> Completion<Image> {
        Completion::spawn(self.shared.clone().wait_for(true))
    }

    /// Drops queued frames, unregisters the surface and fails pending reads
    /// with [`Error::AlreadyReleased`]. Images already read stay valid until
    /// they are released themselves.
    pub fn release(&self) -> Result<()> {
        self.shared.close()
    }

    pub fn release_async(&self) -> Completion<()> {
        let receiver = self.clone();
        Completion::blocking(move || receiver.release())
    }
}

impl fmt::Debug for ImageReceiver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let queue = self.shared.queue.lock();
        f.debug_struct("ImageReceiver")
            .field("size", &self.shared.size)
            .field("format", &self.shared.format)
            .field("capacity", &self.shared.capacity)
            .field("state", &queue.state)
            .field("pending", &queue.pending.len())
            .field("outstanding", &queue.outstanding)
            .finish()
    }
}

/// Producer side of a receiver, resolved from its surface id.
#[derive(Clone, Debug)]
pub struct ProducerSurface {
    id: String,
    shared: Weak<Shared>,
}

impl ProducerSurface {
    /// Finds the receiver registered under `id`.
    pub fn lookup(id: &str) -> Result<Self> {
        let shared = SURFACES
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("no receiving surface {id:?}")))?;
        Ok(ProducerSurface {
            id: id.to_string(),
            shared,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn shared(&self) -> Result<Arc<Shared>> {
        self.shared.upgrade().ok_or(Error::AlreadyReleased)
    }

    pub fn size(&self) -> Result<Size> {
        Ok(self.shared()?.size)
    }

    pub fn format(&self) -> Result<ImageFormat> {
        Ok(self.shared()?.format)
    }

    /// Queues one frame captured at `timestamp` nanoseconds.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] when the receiver already holds `capacity`
    ///   outstanding images
    /// - [`Error::InvalidArgument`] when `data` is not a valid frame for the
    ///   receiver's size and format
    /// - [`Error::AlreadyReleased`] when the receiver was released
    pub fn queue_frame(&self, data: Vec<u8>, timestamp: i64) -> Result<()> {
        let shared = self.shared()?;
        shared.check_frame(&data)?;

        let mut queue = shared.queue.lock();
        if queue.state == ReceiverState::Released {
            return Err(Error::AlreadyReleased);
        }
        if queue.outstanding >= shared.capacity {
            warn!(
                "surface {} refused frame at {timestamp}: {} of {} images outstanding",
                self.id, queue.outstanding, shared.capacity
            );
            return Err(Error::QueueFull {
                capacity: shared.capacity,
            });
        }
        queue.pending.push_back(Frame { data, timestamp });
        queue.outstanding += 1;
        queue.transition(ReceiverState::Receiving);
        let callback = queue.on_arrival.clone();
        drop(queue);

        shared.arrivals.notify_waiters();
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }
}

/// One plane of a received image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component {
    pub component_type: ComponentType,
    /// Distance in bytes between vertically adjacent samples.
    pub row_stride: usize,
    /// Distance in bytes between horizontally adjacent samples.
    pub pixel_stride: usize,
    pub bytes: Vec<u8>,
}

struct ImageInner {
    shared: Arc<Shared>,
    timestamp: i64,
    data: Mutex<Option<Vec<u8>>>,
    clip: Mutex<Region>,
}

impl Drop for ImageInner {
    fn drop(&mut self) {
        if self.data.get_mut().take().is_some() {
            self.shared.return_slot();
        }
    }
}

/// A frame taken from an [`ImageReceiver`].
///
/// The image occupies one of the receiver's slots until
/// [`release`](Image::release) is called or the last clone is dropped.
#[derive(Clone)]
pub struct Image {
    inner: Arc<ImageInner>,
}

impl Image {
    fn new(shared: Arc<Shared>, frame: Frame) -> Self {
        let clip = Region::full(shared.size);
        Image {
            inner: Arc::new(ImageInner {
                shared,
                timestamp: frame.timestamp,
                data: Mutex::new(Some(frame.data)),
                clip: Mutex::new(clip),
            }),
        }
    }

    pub fn size(&self) -> Size {
        self.inner.shared.size
    }

    pub fn format(&self) -> ImageFormat {
        self.inner.shared.format
    }

    /// Capture time in nanoseconds, as given by the producer.
    pub fn timestamp(&self) -> i64 {
        self.inner.timestamp
    }

    pub fn clip_rect(&self) -> Region {
        *self.inner.clip.lock()
    }

    /// Restricts [`to_pixel_map`](Image::to_pixel_map) to `region`.
    pub fn set_clip_rect(&self, region: Region) -> Result<()> {
        region.check_within(self.size())?;
        if self.inner.data.lock().is_none() {
            return Err(Error::AlreadyReleased);
        }
        *self.inner.clip.lock() = region;
        Ok(())
    }

    fn with_data<T>(&self, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
        match self.inner.data.lock().as_deref() {
            Some(data) => f(data),
            None => Err(Error::AlreadyReleased),
        }
    }

    /// Returns a plane of the frame.
    ///
    /// YCbCr 4:2:2 frames expose Y, U and V, the chroma components being
    /// views of the interleaved plane with a pixel stride of 2. JPEG frames
    /// expose a single `Jpeg` component holding the bitstream.
    pub fn component(&self, component_type: ComponentType) -> Result<Component> {
        let width = self.size().width as usize;
        let format = self.format();
        self.with_data(|data| {
            let luma = width * self.size().height as usize;
            let (offset, row_stride, pixel_stride) = match (format, component_type) {
                (ImageFormat::YCbCr422Sp, ComponentType::YuvY) => {
                    return Ok(Component {
                        component_type,
                        row_stride: width,
                        pixel_stride: 1,
                        bytes: data[..luma].to_vec(),
                    })
                }
                (ImageFormat::YCbCr422Sp, ComponentType::YuvU) => (luma, width, 2),
                (ImageFormat::YCbCr422Sp, ComponentType::YuvV) => (luma + 1, width, 2),
                (ImageFormat::Jpeg, ComponentType::Jpeg) => (0, 0, 0),
                (format, other) => {
                    return Err(Error::InvalidArgument(format!(
                        "{format} image has no {other:?} component"
                    )))
                }
            };
            Ok(Component {
                component_type,
                row_stride,
                pixel_stride,
                bytes: data[offset..].to_vec(),
            })
        })
    }

    /// Converts the clipped frame into an RGBA_8888 pixel map.
    pub fn to_pixel_map(&self) -> Result<PixelMap> {
        let clip = self.clip_rect();
        let size = self.size();
        let format = self.format();
        self.with_data(|data| match format {
            ImageFormat::YCbCr422Sp => {
                let rgba = convert::ycbcr422sp_to_rgba(data, size.width, size.height)?;
                let rgba = convert::crop(&rgba, &clip)?;
                PixelMap::from_rgba(
                    &rgba,
                    PixelFormat::Rgba8888,
                    PixelFormat::Rgba8888.natural_alpha(),
                    false,
                    None,
                )
            }
            ImageFormat::Jpeg => decoder::decode(
                data,
                DecodeOptions {
                    desired_region: (clip != Region::full(size)).then_some(clip),
                    ..Default::default()
                },
            ),
        })
    }

    pub fn to_pixel_map_async(&self) -> Completion<PixelMap> {
        let image = self.clone();
        Completion::blocking(move || image.to_pixel_map())
    }

    pub fn component_async(&self, component_type: ComponentType) -> Completion<Component> {
        let image = self.clone();
        Completion::blocking(move || image.component(component_type))
    }

    /// Returns the image's slot to the receiver. A second release fails
    /// with [`Error::AlreadyReleased`].
    pub fn release(&self) -> Result<()> {
        match self.inner.data.lock().take() {
            Some(_) => {
                self.inner.shared.return_slot();
                Ok(())
            }
            None => Err(Error::AlreadyReleased),
        }
    }

    pub fn release_async(&self) -> Completion<()> {
        let image = self.clone();
        Completion::blocking(move || image.release())
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Image")
            .field("size", &self.size())
            .field("format", &self.format())
            .field("timestamp", &self.timestamp())
            .field("clip", &self.clip_rect())
            .finish()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} @ {}", self.size(), self.format(), self.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(size: Size, level: u8) -> Vec<u8> {
        let luma = size.width as usize * size.height as usize;
        let mut data = vec![level; luma];
        data.resize(luma * 2, 128);
        data
    }

    #[test]
    fn arms_on_surface_id() {
        let receiver = ImageReceiver::new(Size::new(4, 2), ImageFormat::YCbCr422Sp, 2).unwrap();
        assert_eq!(receiver.state(), ReceiverState::Idle);
        let id = receiver.receiving_surface_id().unwrap();
        assert_eq!(receiver.receiving_surface_id().unwrap(), id);
        assert_eq!(receiver.state(), ReceiverState::Armed);

        let surface = ProducerSurface::lookup(&id).unwrap();
        surface.queue_frame(gray_frame(Size::new(4, 2), 16), 1).unwrap();
        assert_eq!(receiver.state(), ReceiverState::Receiving);

        receiver.release().unwrap();
        assert!(ProducerSurface::lookup(&id).is_err());
        assert!(matches!(
            surface.queue_frame(gray_frame(Size::new(4, 2), 16), 2),
            Err(Error::AlreadyReleased)
        ));
    }

    #[test]
    fn components_view_the_chroma_plane() {
        let size = Size::new(2, 1);
        let receiver = ImageReceiver::new(size, ImageFormat::YCbCr422Sp, 1).unwrap();
        let surface = ProducerSurface::lookup(&receiver.receiving_surface_id().unwrap()).unwrap();
        surface.queue_frame(vec![10, 20, 30, 40], 7).unwrap();

        let image = receiver.try_read_next_image().unwrap();
        let y = image.component(ComponentType::YuvY).unwrap();
        assert_eq!((y.row_stride, y.pixel_stride, y.bytes), (2, 1, vec![10, 20]));
        let u = image.component(ComponentType::YuvU).unwrap();
        assert_eq!((u.pixel_stride, u.bytes[0]), (2, 30));
        let v = image.component(ComponentType::YuvV).unwrap();
        assert_eq!(v.bytes[0], 40);
        assert!(matches!(
            image.component(ComponentType::Jpeg),
            Err(Error::InvalidArgument(_))
        ));
        receiver.release().unwrap();
    }

    #[test]
    fn rejects_malformed_frames() {
        let receiver = ImageReceiver::new(Size::new(4, 4), ImageFormat::YCbCr422Sp, 1).unwrap();
        let surface = ProducerSurface::lookup(&receiver.receiving_surface_id().unwrap()).unwrap();
        assert!(matches!(
            surface.queue_frame(vec![0; 10], 0),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(receiver.outstanding(), 0);
        assert!(ImageReceiver::new(Size::new(3, 4), ImageFormat::YCbCr422Sp, 1).is_err());
        assert!(ImageReceiver::new(Size::new(4, 4), ImageFormat::Jpeg, 0).is_err());
        receiver.release().unwrap();
    }
}
