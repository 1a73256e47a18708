use lasercam_common::{USB_MANUFACTURER, USB_PID, USB_PRODUCT, USB_VID};
use stm32f4xx_hal::otg_fs::{UsbBus, UsbBusType, USB};
use usb_device::{
    class_prelude::UsbBusAllocator,
    device::{StringDescriptors, UsbDeviceBuilder, UsbVidPid},
};

use crate::xfer_protoc::Xfer;

/// Bring up the CDC serial function the host bridge talks to.
#[allow(non_snake_case)]
pub fn usb_setup(
    usb: USB,
    USB_BUS: &'static mut Option<UsbBusAllocator<UsbBusType>>,
    EP_MEMORY: &'static mut [u32; 1024],
) -> Option<Xfer> {
    let bus: &'static UsbBusAllocator<UsbBusType> = USB_BUS.insert(UsbBus::new(usb, EP_MEMORY));
    let usb_ser = usbd_serial::SerialPort::new(bus);
    let usb_dev = UsbDeviceBuilder::new(bus, UsbVidPid(USB_VID, USB_PID))
        .device_class(usbd_serial::USB_CLASS_CDC)
        .strings(&[StringDescriptors::default()
            .manufacturer(USB_MANUFACTURER)
            .product(USB_PRODUCT)
            .serial_number("0001")])
        .ok()?
        .build();

    Some(Xfer::new(usb_dev, usb_ser))
}
