pub mod bookings;
pub mod invoice_requests;

pub use bookings::{
    BookingListParams, BookingListResponse, BookingResponse, CreateBookingRequest, FieldsParams,
    ReviewBookingRequest,
};
pub use invoice_requests::{
    ChangeDeliveryStatusRequest, ChangeStatusRequest, CreateDraftRequest, FinanceCompleteRequest,
    InvoiceRequestResponse, RequestListParams, RequestListResponse, ReviewOutcomeResponse,
};
